//! The Goblet application: handler tables, hooks and per-invocation dispatch.

use crate::config::GobletConfig;
use crate::constants::{defaults, headers as header_names};
use crate::context::{FunctionInfo, RequestContext};
use crate::error::{Error, GobletError};
use crate::event::{DetectedEvent, EventType};
use crate::logging::LogResource;
use crate::registry::{self, Registration};
use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::router::{handler, Handler, Router};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Runs before the handler, with mutable access to the invocation context.
pub type BeforeHook = Arc<dyn Fn(&mut RequestContext) + Send + Sync>;

/// Runs after the handler (also when it failed) and may rewrite the response.
pub type AfterHook = Arc<dyn Fn(&mut RequestContext, &mut Response) + Send + Sync>;

/// A Pub/Sub topic subscription.
#[derive(Clone)]
pub struct TopicSubscription {
    pub topic: String,
    /// Attributes a message must carry for the handler to run.
    pub attributes: HashMap<String, String>,
    handler: Handler,
}

/// A Cloud Scheduler job triggering the function.
#[derive(Clone)]
pub struct ScheduledJob {
    pub name: String,
    /// Cron expression
    pub schedule: String,
    pub timezone: String,
    pub description: Option<String>,
    handler: Handler,
}

impl fmt::Debug for ScheduledJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledJob")
            .field("name", &self.name)
            .field("schedule", &self.schedule)
            .field("timezone", &self.timezone)
            .field("description", &self.description)
            .finish()
    }
}

struct PendingSchedule {
    name: Option<String>,
    schedule: String,
    timezone: Option<String>,
    description: Option<String>,
    handler: Handler,
}

/// A Cloud Function application.
///
/// # Examples
///
/// ```rust
/// use goblet_core::{Error, Goblet, GobletConfig, Request, RequestContext};
/// use serde_json::json;
///
/// # tokio_test_block_on(async {
/// let app = Goblet::builder()
///     .config(GobletConfig::builder().function_name("users").build())
///     .route("GET", "/users/{id}", |ctx: RequestContext| async move {
///         Ok::<_, Error>(json!({ "id": ctx.get_param("id") }))
///     })
///     .build()
///     .unwrap();
///
/// let request: Request = http::Request::builder()
///     .uri("/users/42")
///     .body(bytes::Bytes::new())
///     .unwrap()
///     .into();
/// let response = app.handle(request).await;
/// assert_eq!(response.body, r#"{"id":"42"}"#);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
pub struct Goblet {
    config: GobletConfig,
    function: Arc<FunctionInfo>,
    router: Router,
    topics: Vec<TopicSubscription>,
    schedules: Vec<ScheduledJob>,
    http: Option<Handler>,
    before: Vec<BeforeHook>,
    after: Vec<AfterHook>,
    headers: HeaderMap,
}

impl Goblet {
    pub fn builder() -> GobletBuilder {
        GobletBuilder::new()
    }

    pub fn config(&self) -> &GobletConfig {
        &self.config
    }

    pub fn function_name(&self) -> &str {
        &self.function.function_name
    }

    pub fn region(&self) -> &str {
        &self.function.region
    }

    /// Scheduled jobs, as deployment tooling needs them.
    pub fn schedules(&self) -> &[ScheduledJob] {
        &self.schedules
    }

    pub fn topics(&self) -> &[TopicSubscription] {
        &self.topics
    }

    /// Cloud Logging resource for log entries written outside an invocation.
    pub fn log_resource(&self) -> LogResource {
        LogResource::cloud_function(&self.function.function_name, &self.function.region, None)
    }

    /// Handle one invocation. Never fails: errors become error responses.
    pub async fn handle(&self, request: Request) -> Response {
        let correlation_id = request
            .header(header_names::CORRELATION_ID)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let span = tracing::info_span!(
            "invocation",
            function_name = %self.function.function_name,
            region = %self.function.region,
            correlation_id = %correlation_id,
            event_type = tracing::field::Empty,
        );

        self.handle_in_span(request, correlation_id, span.clone())
            .instrument(span)
            .await
    }

    async fn handle_in_span(
        &self,
        request: Request,
        correlation_id: String,
        span: tracing::Span,
    ) -> Response {
        let detected = DetectedEvent::detect(&request, &self.function.function_name);
        let event_type = match &detected {
            Ok(DetectedEvent::Schedule { .. }) => EventType::Schedule,
            Ok(DetectedEvent::PubSub { .. }) => EventType::PubSub,
            Ok(DetectedEvent::Http) | Err(_) if !self.router.is_empty() => EventType::Route,
            _ => EventType::Http,
        };
        span.record("event_type", tracing::field::display(event_type));

        let mut ctx = RequestContext::new(
            request,
            event_type,
            correlation_id,
            self.headers.clone(),
            Arc::clone(&self.function),
        );
        let detected = detected.and_then(|event| {
            attach_event(&mut ctx, &event)?;
            Ok(event)
        });

        for hook in &self.before {
            hook(&mut ctx);
        }

        let result = match detected {
            Ok(event) => self.dispatch(event, ctx.clone()).await,
            Err(err) => Err(err.into()),
        };
        let mut response = match result {
            Ok(response) => response,
            Err(err) => error_response(err),
        };

        for hook in &self.after {
            hook(&mut ctx, &mut response);
        }

        tracing::debug!(status = response.status.as_u16(), "invocation complete");
        response
    }

    async fn dispatch(&self, event: DetectedEvent, mut ctx: RequestContext) -> Result<Response, Error> {
        match event {
            DetectedEvent::Schedule { name } => {
                let job = self
                    .schedules
                    .iter()
                    .find(|job| job.name == name)
                    .ok_or_else(|| GobletError::MissingHandler {
                        kind: "schedule",
                        name: name.clone(),
                    })?;
                tracing::info!(job = %job.name, "running scheduled job");
                (job.handler)(ctx).await
            }
            DetectedEvent::PubSub { topic, message, .. } => {
                let subscriptions: Vec<&TopicSubscription> = self
                    .topics
                    .iter()
                    .filter(|subscription| subscription.topic == topic)
                    .collect();
                if subscriptions.is_empty() {
                    return Err(GobletError::MissingHandler {
                        kind: "topic",
                        name: topic,
                    }
                    .into());
                }

                let mut response = Response::empty();
                for subscription in subscriptions {
                    if !message.matches_attributes(&subscription.attributes) {
                        tracing::debug!(
                            topic = %topic,
                            "message attributes do not match subscription filter, skipping"
                        );
                        continue;
                    }
                    response = (subscription.handler)(ctx.clone()).await?;
                }
                Ok(response)
            }
            DetectedEvent::Http => {
                let method = ctx.request.method().as_str().to_string();
                let path = ctx.request.path().to_string();
                if let Some(matched) = self.router.find(&method, &path) {
                    ctx.params = matched.params;
                    ctx.route_pattern = matched.pattern.to_string();
                    return (matched.handler)(ctx).await;
                }
                match &self.http {
                    Some(http) => http(ctx).await,
                    None => {
                        tracing::debug!(method = %method, path = %path, "no route matched");
                        Ok(Response::not_found())
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Goblet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Goblet")
            .field("config", &self.config)
            .field("routes", &self.router)
            .field("topics", &self.topics.iter().map(|t| &t.topic).collect::<Vec<_>>())
            .field("schedules", &self.schedules)
            .field("http", &self.http.is_some())
            .finish()
    }
}

fn attach_event(ctx: &mut RequestContext, event: &DetectedEvent) -> Result<(), GobletError> {
    if let DetectedEvent::PubSub {
        message,
        context,
        raw,
        ..
    } = event
    {
        ctx.data = Some(message.decode_data()?);
        ctx.event = Some(raw.clone());
        ctx.context = context.clone();
    }
    Ok(())
}

fn error_response(err: Error) -> Response {
    match err.downcast_ref::<GobletError>() {
        Some(goblet_error) if goblet_error.status() != StatusCode::INTERNAL_SERVER_ERROR => {
            tracing::warn!(error = %goblet_error, "invocation rejected");
            Response::text(goblet_error.to_string(), goblet_error.status())
        }
        _ => {
            tracing::error!(error = %err, "handler failed");
            Response::text("Internal Server Error", StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Builder for [`Goblet`].
pub struct GobletBuilder {
    config: GobletConfig,
    routes: Vec<(String, String, Handler)>,
    topics: Vec<TopicSubscription>,
    schedules: Vec<PendingSchedule>,
    http: Option<Handler>,
    before: Vec<BeforeHook>,
    after: Vec<AfterHook>,
    headers: HeaderMap,
}

impl GobletBuilder {
    pub fn new() -> Self {
        Self {
            config: GobletConfig::default(),
            routes: Vec::new(),
            topics: Vec::new(),
            schedules: Vec::new(),
            http: None,
            before: Vec::new(),
            after: Vec::new(),
            headers: HeaderMap::new(),
        }
    }

    pub fn config(mut self, config: GobletConfig) -> Self {
        self.config = config;
        self
    }

    pub fn route<F, Fut, R, E>(self, method: &str, path: &str, f: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: IntoResponse,
        E: Into<Error>,
    {
        self.route_handler(method, path, handler(f))
    }

    pub fn route_handler(mut self, method: &str, path: &str, handler: Handler) -> Self {
        self.routes
            .push((method.to_uppercase(), path.to_string(), handler));
        self
    }

    pub fn topic<F, Fut, R, E>(self, topic: &str, f: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: IntoResponse,
        E: Into<Error>,
    {
        self.topic_with_attributes(topic, HashMap::new(), f)
    }

    /// Subscribe to `topic`, only for messages carrying all of `attributes`.
    pub fn topic_with_attributes<F, Fut, R, E>(
        self,
        topic: &str,
        attributes: HashMap<String, String>,
        f: F,
    ) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: IntoResponse,
        E: Into<Error>,
    {
        self.topic_handler(topic, attributes, handler(f))
    }

    pub fn topic_handler(
        mut self,
        topic: &str,
        attributes: HashMap<String, String>,
        handler: Handler,
    ) -> Self {
        self.topics.push(TopicSubscription {
            topic: topic.to_string(),
            attributes,
            handler,
        });
        self
    }

    /// Register a scheduled job named `name` running on the cron `schedule`.
    pub fn schedule<F, Fut, R, E>(self, name: &str, schedule: &str, f: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: IntoResponse,
        E: Into<Error>,
    {
        self.schedule_handler(Some(name), schedule, None, None, handler(f))
    }

    pub fn schedule_handler(
        mut self,
        name: Option<&str>,
        schedule: &str,
        timezone: Option<&str>,
        description: Option<&str>,
        handler: Handler,
    ) -> Self {
        self.schedules.push(PendingSchedule {
            name: name.map(str::to_string),
            schedule: schedule.to_string(),
            timezone: timezone.map(str::to_string),
            description: description.map(str::to_string),
            handler,
        });
        self
    }

    /// Set the catch-all HTTP function.
    pub fn http<F, Fut, R, E>(mut self, f: F) -> Self
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: IntoResponse,
        E: Into<Error>,
    {
        self.http = Some(handler(f));
        self
    }

    pub fn before_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestContext) + Send + Sync + 'static,
    {
        self.before.push(Arc::new(hook));
        self
    }

    pub fn after_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestContext, &mut Response) + Send + Sync + 'static,
    {
        self.after.push(Arc::new(hook));
        self
    }

    /// Add a header to every response produced with `jsonify`.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Pull in every handler declared with the registration macros.
    pub fn from_registry(mut self) -> Self {
        for registration in registry::registered() {
            self = match registration {
                Registration::Route {
                    method,
                    path,
                    handler,
                } => self.route_handler(&method, &path, handler),
                Registration::Topic {
                    topic,
                    attributes,
                    handler,
                } => self.topic_handler(&topic, attributes, handler),
                Registration::Schedule {
                    name,
                    schedule,
                    timezone,
                    description,
                    handler,
                } => self.schedule_handler(
                    name.as_deref(),
                    &schedule,
                    timezone.as_deref(),
                    description.as_deref(),
                    handler,
                ),
                Registration::Http { handler } => {
                    if self.http.is_some() {
                        tracing::warn!("more than one HTTP handler registered, keeping the last");
                    }
                    self.http = Some(handler);
                    self
                }
            };
        }
        self
    }

    pub fn build(self) -> Result<Goblet, GobletError> {
        let mut router = Router::new();
        for (method, path, handler) in self.routes {
            router.add_route(&method, &path, handler)?;
        }

        let function_name = self.config.function_name.clone();
        let schedules = self
            .schedules
            .into_iter()
            .map(|pending| ScheduledJob {
                name: pending.name.unwrap_or_else(|| function_name.clone()),
                schedule: pending.schedule,
                timezone: pending
                    .timezone
                    .unwrap_or_else(|| defaults::TIMEZONE.to_string()),
                description: pending.description,
                handler: pending.handler,
            })
            .collect();

        let function = Arc::new(FunctionInfo {
            function_name,
            region: self.config.region.clone(),
        });

        tracing::debug!(
            function_name = %function.function_name,
            routes = router.len(),
            topics = self.topics.len(),
            "goblet app built"
        );

        Ok(Goblet {
            config: self.config,
            function,
            router,
            topics: self.topics,
            schedules,
            http: self.http,
            before: self.before,
            after: self.after,
            headers: self.headers,
        })
    }
}

impl Default for GobletBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde_json::{json, Value as JsonValue};
    use std::sync::Mutex;

    fn get(uri: &str) -> Request {
        http::Request::builder()
            .uri(uri)
            .body(Bytes::new())
            .unwrap()
            .into()
    }

    fn post_json(body: JsonValue, headers: &[(&str, &str)]) -> Request {
        let mut builder = http::Request::builder().method("POST").uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Bytes::from(body.to_string())).unwrap().into()
    }

    fn push(topic_subscription: &str, data: &str, attributes: JsonValue) -> Request {
        post_json(
            json!({
                "message": {
                    "data": STANDARD.encode(data),
                    "attributes": attributes,
                    "messageId": "42"
                },
                "subscription": format!("projects/p/subscriptions/{}", topic_subscription)
            }),
            &[],
        )
    }

    fn config() -> GobletConfig {
        GobletConfig::builder().function_name("orders").build()
    }

    #[tokio::test]
    async fn test_route_dispatch() {
        let app = Goblet::builder()
            .config(config())
            .route("GET", "/orders/{id}", |ctx: RequestContext| async move {
                Ok::<_, Error>(json!({
                    "id": ctx.get_param("id"),
                    "pattern": ctx.route_pattern(),
                    "type": ctx.event_type.to_string(),
                }))
            })
            .build()
            .unwrap();

        let response = app.handle(get("/orders/7")).await;
        assert_eq!(response.status, StatusCode::OK);
        let body: JsonValue = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["id"], "7");
        assert_eq!(body["pattern"], "/orders/{id}");
        assert_eq!(body["type"], "route");
    }

    #[tokio::test]
    async fn test_route_params_are_decoded() {
        let app = Goblet::builder()
            .route("GET", "/hello/{name}", |ctx: RequestContext| async move {
                Ok::<_, Error>(format!("Hello, {}!", ctx.get_param_or("name", "")))
            })
            .build()
            .unwrap();

        let response = app.handle(get("/hello/John%20Doe")).await;
        assert_eq!(response.body, "Hello, John Doe!");
    }

    #[tokio::test]
    async fn test_unmatched_route_falls_back_to_http_handler() {
        let app = Goblet::builder()
            .route("GET", "/known", |_ctx: RequestContext| async move {
                Ok::<_, Error>("known")
            })
            .http(|ctx: RequestContext| async move {
                Ok::<_, Error>(format!("fallback {}", ctx.path()))
            })
            .build()
            .unwrap();

        let response = app.handle(get("/unknown")).await;
        assert_eq!(response.body, "fallback /unknown");
    }

    #[tokio::test]
    async fn test_unmatched_route_without_http_handler_is_404() {
        let app = Goblet::builder()
            .route("GET", "/known", |_ctx: RequestContext| async move {
                Ok::<_, Error>("known")
            })
            .build()
            .unwrap();

        let response = app.handle(get("/unknown")).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.body, "Not Found");
    }

    #[tokio::test]
    async fn test_http_function() {
        let app = Goblet::builder()
            .http(|ctx: RequestContext| async move {
                Ok::<_, Error>((format!("{}", ctx.event_type), 201))
            })
            .build()
            .unwrap();

        let response = app.handle(get("/")).await;
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.body, "http");
    }

    #[tokio::test]
    async fn test_pubsub_fan_out_with_attribute_filters() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (all, prod, dev) = (seen.clone(), seen.clone(), seen.clone());

        let app = Goblet::builder()
            .config(config())
            .topic("created", move |ctx: RequestContext| {
                let seen = all.clone();
                async move {
                    seen.lock().unwrap().push(format!("all:{}", ctx.data.unwrap_or_default()));
                    Ok::<_, Error>(())
                }
            })
            .topic_with_attributes(
                "created",
                HashMap::from([("env".to_string(), "prod".to_string())]),
                move |_ctx: RequestContext| {
                    let seen = prod.clone();
                    async move {
                        seen.lock().unwrap().push("prod".to_string());
                        Ok::<_, Error>(())
                    }
                },
            )
            .topic_with_attributes(
                "created",
                HashMap::from([("env".to_string(), "dev".to_string())]),
                move |_ctx: RequestContext| {
                    let seen = dev.clone();
                    async move {
                        seen.lock().unwrap().push("dev".to_string());
                        Ok::<_, Error>(())
                    }
                },
            )
            .build()
            .unwrap();

        let response = app
            .handle(push("orders-created", "order 1", json!({"env": "prod"})))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, "");
        assert_eq!(*seen.lock().unwrap(), vec!["all:order 1", "prod"]);
    }

    #[tokio::test]
    async fn test_pubsub_handler_error_stops_fan_out() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let second = seen.clone();

        let app = Goblet::builder()
            .config(config())
            .topic("created", |_ctx: RequestContext| async move {
                Err::<(), Error>("first handler failed".into())
            })
            .topic("created", move |_ctx: RequestContext| {
                let seen = second.clone();
                async move {
                    seen.lock().unwrap().push("second".to_string());
                    Ok::<_, Error>(())
                }
            })
            .build()
            .unwrap();

        let response = app.handle(push("orders-created", "order 1", json!({}))).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body, "Internal Server Error");
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pubsub_exposes_event_and_context() {
        let app = Goblet::builder()
            .topic("legacy", |ctx: RequestContext| async move {
                Ok::<_, Error>(json!({
                    "data": ctx.data,
                    "event_id": ctx.context.and_then(|c| c.event_id),
                    "has_event": ctx.event.is_some(),
                }))
            })
            .build()
            .unwrap();

        let request = post_json(
            json!({
                "context": {
                    "eventId": "evt-1",
                    "eventType": "google.pubsub.topic.publish",
                    "resource": "projects/p/topics/legacy"
                },
                "data": {"data": STANDARD.encode("payload")}
            }),
            &[],
        );
        let response = app.handle(request).await;
        let body: JsonValue = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["data"], "payload");
        assert_eq!(body["event_id"], "evt-1");
        assert_eq!(body["has_event"], true);
    }

    #[tokio::test]
    async fn test_missing_topic_handler() {
        let app = Goblet::builder().config(config()).build().unwrap();
        let response = app.handle(push("orders-unknown", "x", json!({}))).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_schedule_dispatch_and_defaults() {
        let app = Goblet::builder()
            .config(config())
            .schedule("nightly", "0 0 * * *", |_ctx: RequestContext| async move {
                Ok::<_, Error>("ran")
            })
            .schedule_handler(
                None,
                "*/5 * * * *",
                Some("Europe/Rome"),
                Some("every five minutes"),
                handler(|_ctx: RequestContext| async move { Ok::<_, Error>(()) }),
            )
            .build()
            .unwrap();

        let jobs = app.schedules();
        assert_eq!(jobs[0].name, "nightly");
        assert_eq!(jobs[0].timezone, "UTC");
        assert_eq!(jobs[1].name, "orders");
        assert_eq!(jobs[1].timezone, "Europe/Rome");

        let response = app
            .handle(post_json(
                json!({}),
                &[("X-Goblet-Type", "schedule"), ("X-Goblet-Name", "nightly")],
            ))
            .await;
        assert_eq!(response.body, "ran");

        let missing = app
            .handle(post_json(
                json!({}),
                &[("X-Goblet-Type", "schedule"), ("X-Goblet-Name", "weekly")],
            ))
            .await;
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unsupported_event_is_bad_request() {
        let app = Goblet::builder().build().unwrap();
        let request = post_json(
            json!({
                "context": {
                    "eventType": "google.storage.object.finalize",
                    "resource": "projects/_/buckets/b"
                },
                "data": {}
            }),
            &[],
        );
        let response = app.handle(request).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_handler_error_is_500() {
        let app = Goblet::builder()
            .http(|_ctx: RequestContext| async move {
                Err::<(), Error>("database unavailable".into())
            })
            .build()
            .unwrap();

        let response = app.handle(get("/")).await;
        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body, "Internal Server Error");
    }

    #[tokio::test]
    async fn test_hooks_and_correlation_id() {
        #[derive(Clone)]
        struct Marker(&'static str);

        let app = Goblet::builder()
            .header(
                HeaderName::from_static("x-app"),
                HeaderValue::from_static("orders"),
            )
            .before_request(|ctx: &mut RequestContext| {
                ctx.extensions.insert(Marker("before"));
            })
            .http(|ctx: RequestContext| async move {
                let marker = ctx.extensions.get::<Marker>().map(|m| m.0);
                ctx.jsonify(json!({ "marker": marker, "correlation_id": ctx.correlation_id }))
            })
            .after_request(|ctx: &mut RequestContext, response: &mut Response| {
                let marker = ctx.extensions.remove::<Marker>().map(|m| m.0).unwrap_or("none");
                response
                    .headers
                    .insert("x-marker", HeaderValue::from_static(marker));
            })
            .build()
            .unwrap();

        let request: Request = http::Request::builder()
            .uri("/")
            .header("X-Correlation-Id", "corr-9")
            .body(Bytes::new())
            .unwrap()
            .into();
        let response = app.handle(request).await;

        let body: JsonValue = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["marker"], "before");
        assert_eq!(body["correlation_id"], "corr-9");
        assert_eq!(response.headers.get("x-app").unwrap(), "orders");
        assert_eq!(response.headers.get("x-marker").unwrap(), "before");
    }

    #[tokio::test]
    async fn test_generated_correlation_id() {
        let app = Goblet::builder()
            .http(|ctx: RequestContext| async move { Ok::<_, Error>(ctx.correlation_id) })
            .build()
            .unwrap();
        let response = app.handle(get("/")).await;
        assert!(Uuid::parse_str(&response.body).is_ok());
    }

    #[test]
    fn test_invalid_route_fails_build() {
        let result = Goblet::builder()
            .route("GET", "/{bad name}", |_ctx: RequestContext| async move {
                Ok::<_, Error>(())
            })
            .build();
        assert!(matches!(result, Err(GobletError::RoutePattern { .. })));
    }

    #[test]
    fn test_log_resource() {
        let app = Goblet::builder().config(config()).build().unwrap();
        let resource = app.log_resource();
        assert_eq!(resource.labels["function_name"], "orders");
        assert_eq!(resource.labels["correlation_id"], "missing");
    }
}
