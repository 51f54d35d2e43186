//! OpenTelemetry setup for Cloud Functions.
//!
//! [`init_telemetry`] wires up the pieces a function needs:
//! 1. A global propagator accepting `X-Cloud-Trace-Context` and `traceparent`
//! 2. An [`SdkTracerProvider`] with the GCP resource detected from the environment
//! 3. An [`InvocationSpanProcessor`] exporting over OTLP/HTTP when
//!    `OTEL_EXPORTER_OTLP_ENDPOINT` is set
//!
//! The returned [`TelemetryCompletionHandler`] must be completed at the end of
//! every invocation; [`GobletInstrumentor::with_completion_handler`](crate::GobletInstrumentor::with_completion_handler)
//! does that from the after-request hook.
//!
//! ```no_run
//! use goblet_otel::{init_telemetry, TelemetryConfig};
//!
//! # fn example() -> Result<(), goblet_otel::TelemetryError> {
//! let completion_handler = init_telemetry(TelemetryConfig::default())?;
//! // ... handle an invocation ...
//! completion_handler.complete();
//! # Ok(())
//! # }
//! ```

use crate::{
    constants::{defaults, env_vars},
    processor::InvocationSpanProcessor,
    propagation::CloudTraceFormatPropagator,
    resource::get_gcp_resource,
};
use bon::Builder;
use opentelemetry::propagation::{TextMapCompositePropagator, TextMapPropagator};
use opentelemetry::{global, trace::TracerProvider as _, InstrumentationScope, KeyValue};
use opentelemetry_otlp::{Protocol, WithExportConfig};
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    trace::{SdkTracerProvider, SpanProcessor, Tracer, TracerProviderBuilder},
    Resource,
};
use std::{env, sync::Arc};
use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};

/// Errors raised while setting up telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to build OTLP span exporter: {0}")]
    Exporter(String),
}

/// Flushes buffered spans at the end of an invocation.
///
/// Cheap to clone; all clones share the same provider.
#[derive(Clone, Debug)]
pub struct TelemetryCompletionHandler {
    provider: Arc<SdkTracerProvider>,
    tracer: Tracer,
}

impl TelemetryCompletionHandler {
    pub fn new(provider: Arc<SdkTracerProvider>) -> Self {
        let scope = InstrumentationScope::builder(defaults::TRACER_NAME)
            .with_version(env!("CARGO_PKG_VERSION"))
            .with_attributes(vec![
                KeyValue::new("library.language", "rust"),
                KeyValue::new("library.runtime", "gcp_cloud_functions"),
            ])
            .build();
        let tracer = provider.tracer_with_scope(scope);
        Self { provider, tracer }
    }

    /// The tracer spans should be started with.
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    pub fn provider(&self) -> &SdkTracerProvider {
        &self.provider
    }

    /// Exports every span finished so far. Errors are logged, never returned.
    ///
    /// Export blocks, so on a multi-threaded tokio runtime the worker is
    /// handed over with `block_in_place` first.
    pub fn complete(&self) {
        let flush = || {
            if let Err(err) = self.provider.force_flush() {
                tracing::warn!(error = ?err, "error flushing telemetry");
            }
        };
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(flush)
            }
            _ => flush(),
        }
    }
}

/// Configuration for [`init_telemetry`].
///
/// ```no_run
/// use goblet_otel::TelemetryConfig;
/// use opentelemetry::KeyValue;
/// use opentelemetry_sdk::Resource;
///
/// let config = TelemetryConfig::builder()
///     .resource(Resource::builder()
///         .with_attributes(vec![KeyValue::new("service.version", "1.0.0")])
///         .build())
///     .build();
/// ```
#[derive(Builder, Debug)]
pub struct TelemetryConfig {
    #[builder(field)]
    provider_builder: TracerProviderBuilder,

    #[builder(field)]
    has_processor: bool,

    #[builder(field)]
    propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>>,

    /// Register the provider as the global OpenTelemetry tracer provider.
    ///
    /// Default: `true`
    #[builder(default = true)]
    pub set_global_provider: bool,

    /// Resource attached to every span.
    ///
    /// Default: `None` (detected with [`get_gcp_resource`])
    pub resource: Option<Resource>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl<S: telemetry_config_builder::State> TelemetryConfigBuilder<S> {
    /// Adds a span processor. When at least one is added, no OTLP exporter is
    /// created from the environment.
    pub fn with_span_processor<T>(mut self, processor: T) -> Self
    where
        T: SpanProcessor + 'static,
    {
        self.provider_builder = self.provider_builder.with_span_processor(processor);
        self.has_processor = true;
        self
    }

    /// Adds a propagator. When at least one is added, `OTEL_PROPAGATORS` is
    /// ignored.
    pub fn with_propagator<T>(mut self, propagator: T) -> Self
    where
        T: TextMapPropagator + Send + Sync + 'static,
    {
        self.propagators.push(Box::new(propagator));
        self
    }
}

/// Propagators named by `OTEL_PROPAGATORS`.
///
/// Recognises `cloudtrace`, `tracecontext` and `none`. Unset or empty means
/// both Cloud Trace and W3C trace context.
pub(crate) fn propagators_from_env() -> Vec<Box<dyn TextMapPropagator + Send + Sync>> {
    let names = env::var(env_vars::PROPAGATORS).unwrap_or_default();
    let mut names: Vec<String> = names
        .split(',')
        .map(|name| name.trim().to_lowercase())
        .filter(|name| !name.is_empty())
        .collect();
    if names.is_empty() {
        names = vec!["cloudtrace".to_string(), "tracecontext".to_string()];
    }

    let mut propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>> = Vec::new();
    for name in names {
        match name.as_str() {
            "cloudtrace" => propagators.push(Box::new(CloudTraceFormatPropagator::new())),
            "tracecontext" => propagators.push(Box::new(TraceContextPropagator::new())),
            "none" => return Vec::new(),
            other => tracing::warn!(propagator = other, "ignoring unknown propagator"),
        }
    }
    propagators
}

fn otlp_processor() -> Result<Option<impl SpanProcessor>, TelemetryError> {
    if env::var(env_vars::OTLP_ENDPOINT).map_or(true, |endpoint| endpoint.is_empty()) {
        return Ok(None);
    }
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_protocol(Protocol::HttpBinary)
        .build()
        .map_err(|err| TelemetryError::Exporter(err.to_string()))?;
    Ok(Some(
        InvocationSpanProcessor::builder().exporter(exporter).build(),
    ))
}

/// Initializes OpenTelemetry for a Goblet function.
///
/// # Errors
///
/// Fails when `OTEL_EXPORTER_OTLP_ENDPOINT` is set but the OTLP exporter
/// cannot be built.
pub fn init_telemetry(
    mut config: TelemetryConfig,
) -> Result<TelemetryCompletionHandler, TelemetryError> {
    if config.propagators.is_empty() {
        config.propagators = propagators_from_env();
    }
    global::set_text_map_propagator(TextMapCompositePropagator::new(config.propagators));

    if !config.has_processor {
        match otlp_processor()? {
            Some(processor) => {
                config.provider_builder = config.provider_builder.with_span_processor(processor);
            }
            None => tracing::debug!(
                "{} is not set, spans will not be exported",
                env_vars::OTLP_ENDPOINT
            ),
        }
    }

    let resource = config.resource.unwrap_or_else(get_gcp_resource);
    let provider = Arc::new(config.provider_builder.with_resource(resource).build());

    if config.set_global_provider {
        global::set_tracer_provider(provider.as_ref().clone());
    }

    Ok(TelemetryCompletionHandler::new(provider))
}
