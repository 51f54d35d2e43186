use crate::error::GobletError;
use crate::event::{EventContext, EventType};
use crate::logging::LogResource;
use crate::request::Request;
use crate::response::{jsonify, JsonArgs, Response};
use http::{Extensions, HeaderMap};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Static description of the deployed function, shared by every invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub function_name: String,
    pub region: String,
}

/// Per-invocation state passed to handlers and hooks.
///
/// One context is created for every request and dropped when the response has
/// been produced, so nothing here leaks between concurrent invocations.
///
/// # Examples
///
/// ```rust
/// use goblet_core::{Error, RequestContext, Response};
/// use serde_json::json;
///
/// async fn get_user(ctx: RequestContext) -> Result<Response, Error> {
///     let user_id = ctx.get_param_or("id", "anonymous");
///     Ok(ctx.jsonify(json!({ "id": user_id }))?)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The original request
    pub request: Request,
    /// Path parameters extracted from the URL (e.g., {id} -> "123")
    pub params: HashMap<String, String>,
    /// The route template that matched (e.g., "/users/{id}")
    pub route_pattern: String,
    pub event_type: EventType,
    /// Decoded Pub/Sub message data
    pub data: Option<String>,
    /// Raw event payload for Pub/Sub invocations
    pub event: Option<JsonValue>,
    /// Background event metadata, when the event arrived in the legacy format
    pub context: Option<EventContext>,
    pub correlation_id: String,
    /// Headers merged into responses produced by [`RequestContext::jsonify`]
    pub headers: HeaderMap,
    /// Typed per-request storage for hooks and plugins
    pub extensions: Extensions,
    function: Arc<FunctionInfo>,
}

impl RequestContext {
    pub fn new(
        request: Request,
        event_type: EventType,
        correlation_id: String,
        headers: HeaderMap,
        function: Arc<FunctionInfo>,
    ) -> Self {
        Self {
            request,
            params: HashMap::new(),
            route_pattern: String::new(),
            event_type,
            data: None,
            event: None,
            context: None,
            correlation_id,
            headers,
            extensions: Extensions::new(),
            function,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn path(&self) -> &str {
        self.request.path()
    }

    pub fn method(&self) -> &str {
        self.request.method().as_str()
    }

    pub fn route_pattern(&self) -> &str {
        &self.route_pattern
    }

    pub fn function_name(&self) -> &str {
        &self.function.function_name
    }

    pub fn region(&self) -> &str {
        &self.function.region
    }

    /// Returns a path parameter by name, if it exists.
    pub fn get_param(&self, name: &str) -> Option<String> {
        self.params.get(name).cloned()
    }

    /// Returns a path parameter by name, or a default value if it doesn't exist.
    pub fn get_param_or(&self, name: &str, default: &str) -> String {
        self.get_param(name).unwrap_or_else(|| default.to_string())
    }

    /// Deserialize the decoded Pub/Sub data as JSON.
    pub fn data_json<T: DeserializeOwned>(&self) -> Result<Option<T>, GobletError> {
        self.data
            .as_deref()
            .map(|data| {
                serde_json::from_str(data).map_err(|e| GobletError::InvalidEvent(e.to_string()))
            })
            .transpose()
    }

    /// Serialize `value` into a `200` JSON response carrying this invocation's headers.
    pub fn jsonify<T: Serialize>(&self, value: T) -> Result<Response, GobletError> {
        jsonify(serde_json::to_value(value)?, &self.headers)
    }

    /// Like [`RequestContext::jsonify`] but with explicit positional/keyword arguments.
    pub fn jsonify_args(&self, args: JsonArgs) -> Result<Response, GobletError> {
        jsonify(args, &self.headers)
    }

    /// Cloud Logging resource describing this invocation.
    pub fn log_resource(&self) -> LogResource {
        LogResource::cloud_function(
            &self.function.function_name,
            &self.function.region,
            Some(&self.correlation_id),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::JsonArgs;
    use bytes::Bytes;
    use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
    use serde_json::json;

    fn context() -> RequestContext {
        let request: Request = http::Request::builder()
            .uri("/users/7")
            .body(Bytes::new())
            .unwrap()
            .into();
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-app"),
            HeaderValue::from_static("goblet"),
        );
        RequestContext::new(
            request,
            EventType::Route,
            "corr-1".to_string(),
            headers,
            Arc::new(FunctionInfo {
                function_name: "users".to_string(),
                region: "europe-west1".to_string(),
            }),
        )
    }

    #[test]
    fn test_params() {
        let mut ctx = context();
        ctx.params.insert("id".to_string(), "7".to_string());
        assert_eq!(ctx.get_param("id").as_deref(), Some("7"));
        assert_eq!(ctx.get_param_or("missing", "fallback"), "fallback");
    }

    #[test]
    fn test_jsonify_uses_invocation_headers() {
        let ctx = context();
        let response = ctx.jsonify(json!({"a": 1})).unwrap();
        assert_eq!(response.body, r#"{"a":1}"#);
        assert_eq!(response.headers.get("x-app").unwrap(), "goblet");
        assert_eq!(
            response.headers.get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_jsonify_args_misuse() {
        let ctx = context();
        let err = ctx
            .jsonify_args(JsonArgs::new().arg(1).kwarg("k", 2))
            .unwrap_err();
        assert!(matches!(err, GobletError::JsonifyArgs));
    }

    #[test]
    fn test_data_json() {
        let mut ctx = context();
        assert_eq!(ctx.data_json::<JsonValue>().unwrap(), None);
        ctx.data = Some(r#"{"order":1}"#.to_string());
        assert_eq!(
            ctx.data_json::<JsonValue>().unwrap(),
            Some(json!({"order": 1}))
        );
    }

    #[test]
    fn test_log_resource() {
        let ctx = context();
        let resource = ctx.log_resource();
        assert_eq!(resource.resource_type, "cloud_function");
        assert_eq!(resource.labels["function_name"], "users");
        assert_eq!(resource.labels["region"], "europe-west1");
        assert_eq!(resource.labels["correlation_id"], "corr-1");
    }
}
