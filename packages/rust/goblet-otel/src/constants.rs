//! Constants for the goblet-otel package.

/// Environment variable names for configuration.
pub mod env_vars {
    /// Maximum number of spans to queue in the InvocationSpanProcessor.
    pub const QUEUE_SIZE: &str = "GOBLET_SPAN_PROCESSOR_QUEUE_SIZE";

    /// Maximum batch size for span export.
    pub const BATCH_SIZE: &str = "GOBLET_SPAN_PROCESSOR_BATCH_SIZE";

    /// Service name for telemetry.
    pub const SERVICE_NAME: &str = "OTEL_SERVICE_NAME";

    /// Resource attributes in KEY=VALUE,KEY2=VALUE2 format.
    pub const RESOURCE_ATTRIBUTES: &str = "OTEL_RESOURCE_ATTRIBUTES";

    /// OTLP collector endpoint. Spans are only exported when this is set.
    pub const OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

    /// Comma-separated list of context propagators to use.
    /// Valid values: cloudtrace, tracecontext, none
    pub const PROPAGATORS: &str = "OTEL_PROPAGATORS";

    /// Cloud Run / 2nd gen function service name.
    pub const K_SERVICE: &str = "K_SERVICE";

    /// Cloud Run / 2nd gen function revision.
    pub const K_REVISION: &str = "K_REVISION";

    /// 1st gen function name.
    pub const FUNCTION_NAME: &str = "FUNCTION_NAME";

    /// Entry point of the function.
    pub const FUNCTION_TARGET: &str = "FUNCTION_TARGET";

    /// Region the function is deployed to.
    pub const FUNCTION_REGION: &str = "FUNCTION_REGION";
}

/// Default values for configuration parameters.
pub mod defaults {
    /// Default maximum queue size for InvocationSpanProcessor.
    pub const QUEUE_SIZE: usize = 2048;

    /// Default maximum batch size for InvocationSpanProcessor.
    pub const BATCH_SIZE: usize = 512;

    /// Instrumentation scope name of the tracer used by the instrumentor.
    pub const TRACER_NAME: &str = "goblet";
}

/// Trace propagation headers.
pub mod headers {
    /// Google Cloud Trace context header.
    pub const CLOUD_TRACE_CONTEXT: &str = "x-cloud-trace-context";

    /// W3C trace context header.
    pub const TRACEPARENT: &str = "traceparent";
}

/// Resource attribute keys used in the GCP resource.
pub mod resource_attributes {
    pub const CLOUD_PROVIDER: &str = "cloud.provider";
    pub const CLOUD_PLATFORM: &str = "cloud.platform";
    pub const CLOUD_REGION: &str = "cloud.region";
    pub const FAAS_NAME: &str = "faas.name";
    pub const FAAS_VERSION: &str = "faas.version";
    pub const SERVICE_NAME: &str = "service.name";

    /// Value of `cloud.provider`.
    pub const PROVIDER_GCP: &str = "gcp";

    /// Value of `cloud.platform`.
    pub const PLATFORM_CLOUD_FUNCTIONS: &str = "gcp_cloud_functions";
}
