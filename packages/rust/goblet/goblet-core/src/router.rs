use crate::context::RequestContext;
use crate::error::{Error, GobletError};
use crate::response::{into_handler_result, IntoResponse, Response};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by every boxed handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Response, Error>> + Send>>;

/// A type-erased handler for routes, topics, schedules and the HTTP function.
pub type Handler = Arc<dyn Fn(RequestContext) -> HandlerFuture + Send + Sync>;

/// Box an async function into a [`Handler`].
///
/// ```rust
/// use goblet_core::{handler, Error, RequestContext};
///
/// let h = handler(|ctx: RequestContext| async move {
///     Ok::<_, Error>(format!("Hello from {}", ctx.path()))
/// });
/// # let _ = h;
/// ```
pub fn handler<F, Fut, R, E>(f: F) -> Handler
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse,
    E: Into<Error>,
{
    Arc::new(move |ctx| {
        let fut = f(ctx);
        Box::pin(async move { into_handler_result(fut.await) }) as HandlerFuture
    })
}

struct Route {
    method: String,
    path: String,
    regex: Regex,
    handler: Handler,
}

/// A route that matched an incoming request.
pub struct RouteMatch<'a> {
    pub handler: &'a Handler,
    pub pattern: &'a str,
    pub params: HashMap<String, String>,
}

/// Matches HTTP requests against registered path templates.
///
/// Templates are made of literal segments, `{name}` parameters matching a
/// single segment and `{name+}` parameters matching the rest of the path.
/// Routes are tried in registration order.
///
/// # Examples
///
/// ```rust
/// use goblet_core::{handler, Error, RequestContext, Router};
/// use serde_json::json;
///
/// let mut router = Router::new();
/// router
///     .add_route("GET", "/hello/{name}", handler(|ctx: RequestContext| async move {
///         let name = ctx.get_param_or("name", "World");
///         Ok::<_, Error>(json!({ "message": format!("Hello, {}!", name) }))
///     }))
///     .unwrap();
///
/// let matched = router.find("GET", "/hello/goblet").unwrap();
/// assert_eq!(matched.params["name"], "goblet");
/// ```
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Register `handler` for `method` requests matching `path`.
    pub fn add_route(
        &mut self,
        method: &str,
        path: &str,
        handler: Handler,
    ) -> Result<(), GobletError> {
        let regex = compile_pattern(path)?;
        self.routes.push(Route {
            method: method.to_uppercase(),
            path: path.to_string(),
            regex,
            handler,
        });
        Ok(())
    }

    /// Find the first route matching `method` and `path`.
    pub fn find(&self, method: &str, path: &str) -> Option<RouteMatch<'_>> {
        let method = method.to_uppercase();
        self.routes
            .iter()
            .filter(|route| route.method == method)
            .find_map(|route| {
                let captures = route.regex.captures(path)?;
                let params = route
                    .regex
                    .capture_names()
                    .flatten()
                    .filter_map(|name| {
                        captures
                            .name(name)
                            .map(|value| (name.to_string(), decode_param(value.as_str())))
                    })
                    .collect();
                Some(RouteMatch {
                    handler: &route.handler,
                    pattern: &route.path,
                    params,
                })
            })
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }
}

/// Percent-decode a captured path segment. Invalid UTF-8 keeps the raw text.
fn decode_param(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|value| value.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.routes
                    .iter()
                    .map(|route| format!("{} {}", route.method, route.path)),
            )
            .finish()
    }
}

fn compile_pattern(path: &str) -> Result<Regex, GobletError> {
    let regex_pattern = path
        .split('/')
        .map(|segment| {
            if segment.starts_with('{') && segment.ends_with('}') && segment.len() > 2 {
                let param_name = segment[1..segment.len() - 1].trim_end_matches('+');
                if segment.ends_with("+}") {
                    format!("(?P<{}>.*)", param_name)
                } else {
                    format!("(?P<{}>[^/]+)", param_name)
                }
            } else {
                regex::escape(segment)
            }
        })
        .collect::<Vec<_>>()
        .join("/");

    Regex::new(&format!("^{}$", regex_pattern)).map_err(|source| GobletError::RoutePattern {
        pattern: path.to_string(),
        source,
    })
}
