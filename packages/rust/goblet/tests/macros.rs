use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use goblet::{
    http_handler, route, schedule, topic, Error, Goblet, GobletConfig, Request, RequestContext,
    Response,
};
use http::StatusCode;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

static PROD_ORDERS: AtomicUsize = AtomicUsize::new(0);
static ALL_ORDERS: AtomicUsize = AtomicUsize::new(0);

#[route(path = "/users/{id}")]
async fn get_user(ctx: RequestContext) -> Result<Value, Error> {
    Ok(json!({ "id": ctx.get_param("id"), "method": ctx.method() }))
}

#[route(path = "/users/{id}", method = "post")]
async fn update_user(ctx: RequestContext) -> Result<Response, Error> {
    let body: Value = ctx.request.json()?;
    Ok(ctx.jsonify(json!({ "id": ctx.get_param("id"), "body": body }))?)
}

#[route(path = "/files/{path+}")]
async fn get_file(ctx: RequestContext) -> Result<(String, u16), Error> {
    Ok((ctx.get_param_or("path", ""), 203))
}

#[topic(name = "orders")]
async fn count_orders(_ctx: RequestContext) -> Result<(), Error> {
    ALL_ORDERS.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

#[topic(name = "orders", attributes(env = "prod"))]
async fn prod_orders(ctx: RequestContext) -> Result<(), Error> {
    assert_eq!(ctx.data.as_deref(), Some("order-1"));
    PROD_ORDERS.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

#[schedule(schedule = "0 3 * * *", name = "nightly", description = "Nightly cleanup")]
async fn nightly(_ctx: RequestContext) -> Result<&'static str, Error> {
    Ok("cleaned")
}

#[schedule(schedule = "*/10 * * * *", timezone = "Europe/Rome")]
async fn default_named(_ctx: RequestContext) -> Result<(), Error> {
    Ok(())
}

#[http_handler]
async fn fallback(ctx: RequestContext) -> Result<String, Error> {
    Ok(format!("fallback {}", ctx.path()))
}

fn app() -> Goblet {
    Goblet::builder()
        .config(GobletConfig::builder().function_name("shop").build())
        .from_registry()
        .build()
        .unwrap()
}

fn request(method: &str, uri: &str, headers: &[(&str, &str)], body: Value) -> Request {
    let mut builder = http::Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let body = if body.is_null() {
        Bytes::new()
    } else {
        Bytes::from(body.to_string())
    };
    builder.body(body).unwrap().into()
}

#[tokio::test]
async fn test_route_macros() {
    let app = app();

    let response = app.handle(request("GET", "/users/7", &[], Value::Null)).await;
    let body: Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(body, json!({ "id": "7", "method": "GET" }));

    let response = app
        .handle(request("POST", "/users/7", &[], json!({ "name": "ada" })))
        .await;
    assert_eq!(response.body, r#"{"id":"7","body":{"name":"ada"}}"#);

    let response = app
        .handle(request("GET", "/files/a/b/c.txt", &[], Value::Null))
        .await;
    assert_eq!(response.status, StatusCode::NON_AUTHORITATIVE_INFORMATION);
    assert_eq!(response.body, "a/b/c.txt");
}

#[tokio::test]
async fn test_http_handler_macro_catches_unmatched_requests() {
    let response = app().handle(request("DELETE", "/users/7", &[], Value::Null)).await;
    assert_eq!(response.body, "fallback /users/7");
}

#[tokio::test]
async fn test_topic_macros() {
    let app = app();
    let push = json!({
        "message": {
            "data": STANDARD.encode("order-1"),
            "attributes": { "env": "prod" }
        },
        "subscription": "projects/p/subscriptions/shop-orders"
    });

    let response = app.handle(request("POST", "/", &[], push)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(ALL_ORDERS.load(Ordering::SeqCst), 1);
    assert_eq!(PROD_ORDERS.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_schedule_macros() {
    let app = app();

    let jobs = app.schedules();
    let nightly = jobs.iter().find(|job| job.name == "nightly").unwrap();
    assert_eq!(nightly.schedule, "0 3 * * *");
    assert_eq!(nightly.timezone, "UTC");
    assert_eq!(nightly.description.as_deref(), Some("Nightly cleanup"));
    let default_named = jobs.iter().find(|job| job.name == "shop").unwrap();
    assert_eq!(default_named.timezone, "Europe/Rome");

    let response = app
        .handle(request(
            "POST",
            "/",
            &[("X-Goblet-Type", "schedule"), ("X-Goblet-Name", "nightly")],
            json!({}),
        ))
        .await;
    assert_eq!(response.body, "cleaned");
}
