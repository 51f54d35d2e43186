use goblet::{
    http_handler, init_logging, route, schedule, serve, topic, Error, Goblet, GobletConfig,
    RequestContext, Response,
};
use goblet_otel::{init_telemetry, GobletInstrumentor, TelemetryConfig};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct Order {
    id: String,
    #[serde(default)]
    total: f64,
}

#[route(path = "/hello/{name}")]
async fn handle_hello(ctx: RequestContext) -> Result<Value, Error> {
    let name = ctx.get_param_or("name", "World");
    Ok(json!({
        "message": format!("Hello, {}!", name)
    }))
}

#[route(path = "/orders", method = "POST")]
async fn create_order(ctx: RequestContext) -> Result<Response, Error> {
    let order: Order = ctx.request.json()?;
    tracing::info!(order_id = %order.id, total = order.total, "order received");
    Ok(ctx.jsonify(json!({ "id": order.id, "status": "accepted" }))?)
}

#[topic(name = "orders", attributes(source = "checkout"))]
async fn on_checkout_order(ctx: RequestContext) -> Result<(), Error> {
    let order: Option<Order> = ctx.data_json()?;
    match order {
        Some(order) => tracing::info!(order_id = %order.id, "processing order"),
        None => tracing::warn!("order message without data"),
    }
    Ok(())
}

#[schedule(schedule = "0 3 * * *", name = "nightly-report", description = "Nightly order report")]
async fn nightly_report(_ctx: RequestContext) -> Result<(), Error> {
    tracing::info!("building nightly report");
    Ok(())
}

#[http_handler]
async fn fallback(ctx: RequestContext) -> Result<(String, u16), Error> {
    Ok((format!("no route for {} {}", ctx.method(), ctx.path()), 404))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = GobletConfig::from_env();
    init_logging(&config)?;

    let telemetry = init_telemetry(TelemetryConfig::default())?;

    let builder = Goblet::builder().config(config).from_registry();
    let app = GobletInstrumentor::from_completion_handler(&telemetry)
        .instrument_app(builder)
        .build()?;

    for job in app.schedules() {
        tracing::info!(name = %job.name, schedule = %job.schedule, "scheduled job");
    }

    serve(app).await?;
    Ok(())
}
