use http::StatusCode;
use thiserror::Error;

/// Error type returned by user handlers and hooks.
///
/// Any error convertible into a boxed `std::error::Error` can be returned from a
/// handler; the framework logs it and answers with a `500`.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the framework itself.
#[derive(Debug, Error)]
pub enum GobletError {
    #[error("jsonify() behavior undefined when passed both args and kwargs")]
    JsonifyArgs,

    #[error("failed to serialize response body: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid route pattern {pattern}: {source}")]
    RoutePattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unsupported event type: {0}")]
    UnsupportedEventType(String),

    #[error("no {kind} handler registered for {name}")]
    MissingHandler { kind: &'static str, name: String },

    #[error("invalid event payload: {0}")]
    InvalidEvent(String),

    #[error("failed to decode message data: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("message data is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("failed to initialise logging: {0}")]
    Logging(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GobletError {
    /// HTTP status the framework answers with when this error ends an invocation.
    pub fn status(&self) -> StatusCode {
        match self {
            GobletError::UnsupportedEventType(_)
            | GobletError::InvalidEvent(_)
            | GobletError::Decode(_)
            | GobletError::Utf8(_) => StatusCode::BAD_REQUEST,
            GobletError::MissingHandler { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
