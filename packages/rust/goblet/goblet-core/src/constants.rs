//! Constants shared across goblet-core.
//!
//! Environment variable names, request headers and defaults live here so the
//! Cloud Functions contract is spelled out in one place.

/// Environment variable names for configuration.
pub mod env_vars {
    /// Explicit function name override.
    pub const FUNCTION_NAME: &str = "FUNCTION_NAME";

    /// Service name set by the Cloud Functions (2nd gen) / Cloud Run host.
    pub const K_SERVICE: &str = "K_SERVICE";

    /// Entry point name set by the Functions Framework.
    pub const FUNCTION_TARGET: &str = "FUNCTION_TARGET";

    /// Region the function is deployed to.
    pub const FUNCTION_REGION: &str = "FUNCTION_REGION";

    /// Enables structured Cloud Logging output ("true", "1" or "yes").
    pub const STACKDRIVER: &str = "GOBLET_STACKDRIVER";

    /// Port the host expects the function to listen on.
    pub const PORT: &str = "PORT";

    /// Fallback log level when `RUST_LOG` is not set.
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
}

/// Default values for configuration parameters.
pub mod defaults {
    pub const FUNCTION_NAME: &str = "goblet";

    pub const REGION: &str = "us-east4";

    pub const PORT: u16 = 8080;

    pub const LOG_LEVEL: &str = "info";

    /// Timezone used for scheduled jobs that do not declare one.
    pub const TIMEZONE: &str = "UTC";
}

/// Request headers the framework understands.
pub mod headers {
    /// Set by Cloud Scheduler jobs created for `#[schedule]` handlers.
    pub const GOBLET_TYPE: &str = "x-goblet-type";

    /// Name of the scheduled job being triggered.
    pub const GOBLET_NAME: &str = "x-goblet-name";

    pub const CORRELATION_ID: &str = "x-correlation-id";

    pub const USER_AGENT: &str = "user-agent";

    /// User agent prefix used by Pub/Sub push deliveries.
    pub const PUBSUB_PUSH_USER_AGENT: &str = "APIs-Google";
}

/// Background event types that map to Pub/Sub handlers.
pub mod event_types {
    pub const PUBSUB_PUBLISH: &str = "google.pubsub.topic.publish";

    pub const PUBSUB_PUBLISH_LEGACY: &str = "providers/cloud.pubsub/eventTypes/topic.publish";
}
