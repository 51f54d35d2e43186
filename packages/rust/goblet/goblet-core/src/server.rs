//! HTTP server implementing the Functions Framework contract: listen on
//! `$PORT` and hand every request to the app.

use crate::app::Goblet;
use crate::error::GobletError;
use crate::request::Request;
use crate::response::Response;
use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Bind `0.0.0.0:{config.port}` and serve until Ctrl-C.
pub async fn serve(app: Goblet) -> Result<(), GobletError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], app.config().port));
    let listener = TcpListener::bind(addr).await?;
    serve_with_listener(app, listener).await
}

/// Serve on an already bound listener until Ctrl-C.
pub async fn serve_with_listener(app: Goblet, listener: TcpListener) -> Result<(), GobletError> {
    serve_with_shutdown(app, listener, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Serve on `listener` until `shutdown` resolves. Connections already
/// accepted keep running on their own tasks.
pub async fn serve_with_shutdown<F>(
    app: Goblet,
    listener: TcpListener,
    shutdown: F,
) -> Result<(), GobletError>
where
    F: Future<Output = ()>,
{
    let addr = listener.local_addr()?;
    tracing::info!(
        address = %addr,
        function_name = %app.function_name(),
        "goblet function listening"
    );

    let app = Arc::new(app);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(connection) => connection,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };
                let app = Arc::clone(&app);
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let app = Arc::clone(&app);
                        async move { Ok::<_, Infallible>(handle(&app, req).await) }
                    });
                    if let Err(e) = auto::Builder::new(TokioExecutor::new())
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        tracing::debug!(error = %e, remote = %remote, "connection closed with error");
                    }
                });
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received, stopping server");
                break;
            }
        }
    }
    Ok(())
}

async fn handle(app: &Goblet, req: hyper::Request<Incoming>) -> hyper::Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read request body");
            return into_hyper(Response::text("Bad Request", StatusCode::BAD_REQUEST));
        }
    };
    let request = Request::new(parts.method, parts.uri, parts.headers, body);
    into_hyper(app.handle(request).await)
}

fn into_hyper(response: Response) -> hyper::Response<Full<Bytes>> {
    let (body, status, headers) = response.into_parts();
    let mut response = hyper::Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
