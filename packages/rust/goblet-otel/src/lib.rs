//! Cloud Trace propagation and OpenTelemetry instrumentation for Goblet functions.
//!
//! # Features
//!
//! - **Cloud Trace headers**: parse `X-Cloud-Trace-Context` and `traceparent`,
//!   and propagate the Cloud Trace format through the OpenTelemetry API
//! - **Request instrumentation**: one server span per invocation, linked to the
//!   caller, with the trace id echoed back in the response headers
//! - **Flush per invocation**: spans are exported before the function goes idle
//! - **Resource detection**: Cloud Functions attributes read from the environment
//!
//! # Architecture
//!
//! - [`propagation`]: trace header parsing and [`CloudTraceFormatPropagator`]
//! - [`instrumentation`]: [`GobletInstrumentor`] before/after hooks
//! - [`telemetry`]: [`init_telemetry`] and [`TelemetryCompletionHandler`]
//! - [`processor`]: [`InvocationSpanProcessor`]
//! - [`resource`]: [`get_gcp_resource`]
//!
//! # Quick Start
//!
//! ```no_run
//! use goblet::{route, Error, RequestContext};
//! use goblet_otel::{init_telemetry, GobletInstrumentor, TelemetryConfig};
//!
//! #[route(path = "/")]
//! async fn hello(_ctx: RequestContext) -> Result<&'static str, Error> {
//!     Ok("Hello!")
//! }
//!
//! goblet::goblet_entrypoint!(|builder: goblet::GobletBuilder| {
//!     match init_telemetry(TelemetryConfig::default()) {
//!         Ok(telemetry) => GobletInstrumentor::from_completion_handler(&telemetry)
//!             .instrument_app(builder),
//!         Err(_) => builder,
//!     }
//! });
//! ```
//!
//! # Configuration
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: collector to export spans to over OTLP/HTTP.
//!   Without it spans are recorded but not exported.
//! - `OTEL_PROPAGATORS`: `cloudtrace`, `tracecontext` or `none` (default: both)
//! - `OTEL_SERVICE_NAME`, `OTEL_RESOURCE_ATTRIBUTES`: resource overrides
//! - `GOBLET_SPAN_PROCESSOR_QUEUE_SIZE`, `GOBLET_SPAN_PROCESSOR_BATCH_SIZE`:
//!   span buffer tuning

pub mod constants;
pub mod instrumentation;
pub mod processor;
pub mod propagation;
pub mod resource;
pub mod telemetry;

pub use instrumentation::{instrument_app, ActiveTrace, GobletInstrumentor};
pub use processor::InvocationSpanProcessor;
pub use propagation::{
    format_cloud_trace, CloudTraceFormatPropagator, TraceHeader, TraceHeaderError,
    TraceHeaderFormat,
};
pub use resource::get_gcp_resource;
pub use telemetry::{init_telemetry, TelemetryCompletionHandler, TelemetryConfig, TelemetryError};

#[cfg(doctest)]
extern crate doc_comment;

#[cfg(doctest)]
use doc_comment::doctest;

#[cfg(doctest)]
doctest!("../README.md", readme);
