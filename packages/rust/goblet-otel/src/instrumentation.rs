//! Request instrumentation for Goblet apps.
//!
//! [`GobletInstrumentor`] registers a before-request hook that reads the
//! incoming trace header and starts a server span linked to it, and an
//! after-request hook that ends the span and stamps `X-Cloud-Trace-Context` on
//! the response.
//!
//! The span is a new root span carrying a [`Link`] to the caller's context.
//! The propagation carrier travels with the request in
//! [`RequestContext::extensions`] as an [`ActiveTrace`], so concurrent
//! invocations never share state. A missing or malformed trace header is
//! logged and the request proceeds with an unlinked span.
//!
//! ```no_run
//! use goblet::{route, Error, Goblet, RequestContext};
//! use goblet_otel::{init_telemetry, GobletInstrumentor, TelemetryConfig};
//!
//! #[route(path = "/")]
//! async fn hello(_ctx: RequestContext) -> Result<&'static str, Error> {
//!     Ok("Hello!")
//! }
//!
//! # fn example() -> Result<(), Error> {
//! let telemetry = init_telemetry(TelemetryConfig::default())?;
//! let app = GobletInstrumentor::from_completion_handler(&telemetry)
//!     .instrument_app(Goblet::builder().from_registry())
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use crate::constants::{defaults, headers::CLOUD_TRACE_CONTEXT};
use crate::propagation::{format_cloud_trace, CloudTraceFormatPropagator, TraceHeader, TraceHeaderError};
use crate::telemetry::TelemetryCompletionHandler;
use goblet::http::HeaderValue;
use goblet::{EventType, GobletBuilder, RequestContext, Response};
use opentelemetry::{
    global::{self, BoxedTracer},
    propagation::TextMapPropagator,
    trace::{Link, SpanContext, SpanKind, Status, TraceContextExt, Tracer},
    Context, KeyValue,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Trace state of an in-flight request, stored in the request extensions.
#[derive(Debug, Clone)]
pub struct ActiveTrace {
    /// Context holding the invocation span.
    pub context: Context,
    /// Propagation headers injected from `context`.
    pub carrier: HashMap<String, String>,
    /// The caller's span context, when a usable trace header was received.
    pub remote: Option<SpanContext>,
}

impl ActiveTrace {
    /// The span context the response header is written from.
    pub fn span_context(&self, propagator: &CloudTraceFormatPropagator) -> SpanContext {
        propagator
            .extract(&self.carrier)
            .span()
            .span_context()
            .clone()
    }
}

fn faas_trigger(event_type: EventType) -> &'static str {
    match event_type {
        EventType::Http | EventType::Route => "http",
        EventType::PubSub => "pubsub",
        EventType::Schedule => "timer",
    }
}

/// Starts and finishes a span around every invocation.
pub struct GobletInstrumentor<T = BoxedTracer> {
    tracer: T,
    propagator: CloudTraceFormatPropagator,
    completion: Option<TelemetryCompletionHandler>,
}

impl GobletInstrumentor<BoxedTracer> {
    /// Uses the tracer of the global provider.
    pub fn global() -> Self {
        Self::new(global::tracer(defaults::TRACER_NAME))
    }
}

impl Default for GobletInstrumentor<BoxedTracer> {
    fn default() -> Self {
        Self::global()
    }
}

impl GobletInstrumentor<opentelemetry_sdk::trace::Tracer> {
    /// Uses the handler's tracer and flushes spans after every invocation.
    pub fn from_completion_handler(handler: &TelemetryCompletionHandler) -> Self {
        Self::new(handler.tracer().clone()).with_completion_handler(handler.clone())
    }
}

impl<T> GobletInstrumentor<T>
where
    T: Tracer + Send + Sync + 'static,
    T::Span: Send + Sync + 'static,
{
    pub fn new(tracer: T) -> Self {
        Self {
            tracer,
            propagator: CloudTraceFormatPropagator::new(),
            completion: None,
        }
    }

    /// Completes the handler once the response is ready.
    pub fn with_completion_handler(mut self, handler: TelemetryCompletionHandler) -> Self {
        self.completion = Some(handler);
        self
    }

    /// Registers the before and after hooks on `builder`.
    pub fn instrument_app(self, builder: GobletBuilder) -> GobletBuilder {
        let instrumentor = Arc::new(self);
        let before = Arc::clone(&instrumentor);
        builder
            .before_request(move |ctx| before.before_request(ctx))
            .after_request(move |ctx, response| instrumentor.after_request(ctx, response))
    }

    fn remote_context(ctx: &RequestContext) -> Option<SpanContext> {
        match TraceHeader::from_headers(ctx.request.headers()).and_then(|h| h.span_context()) {
            Ok(span_context) => Some(span_context),
            Err(TraceHeaderError::Missing) => {
                tracing::debug!("no trace header, starting an unlinked span");
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "unusable trace header, starting an unlinked span");
                None
            }
        }
    }

    /// Starts the invocation span and stores it in the request extensions.
    pub fn before_request(&self, ctx: &mut RequestContext) {
        let remote = Self::remote_context(ctx);

        let mut builder = self
            .tracer
            .span_builder(ctx.path().to_string())
            .with_kind(SpanKind::Server)
            .with_attributes(vec![
                KeyValue::new("faas.trigger", faas_trigger(ctx.event_type)),
                KeyValue::new("faas.name", ctx.function_name().to_string()),
                KeyValue::new("http.request.method", ctx.method().to_string()),
                KeyValue::new("url.path", ctx.path().to_string()),
                KeyValue::new("goblet.event_type", ctx.event_type.to_string()),
                KeyValue::new("goblet.correlation_id", ctx.correlation_id.clone()),
            ]);
        if let Some(remote) = &remote {
            builder = builder.with_links(vec![Link::with_context(remote.clone())]);
        }
        let span = builder.start_with_context(&self.tracer, &Context::new());

        let context = Context::new().with_span(span);
        let mut carrier = HashMap::new();
        self.propagator.inject_context(&context, &mut carrier);

        ctx.extensions.insert(ActiveTrace {
            context,
            carrier,
            remote,
        });
    }

    /// Ends the invocation span and stamps the trace header on the response.
    pub fn after_request(&self, ctx: &mut RequestContext, response: &mut Response) {
        let Some(active) = ctx.extensions.remove::<ActiveTrace>() else {
            return;
        };

        let span = active.context.span();
        let status = response.status.as_u16();
        span.set_attribute(KeyValue::new("http.response.status_code", i64::from(status)));
        if response.status.is_server_error() {
            span.set_status(Status::error(format!("status {}", status)));
        }
        span.end();

        let span_context = active.span_context(&self.propagator);
        let span_context = if span_context.is_valid() {
            Some(span_context)
        } else {
            active.remote.clone()
        };
        match span_context.map(|sc| HeaderValue::from_str(&format_cloud_trace(&sc))) {
            Some(Ok(value)) => {
                response.headers.insert(CLOUD_TRACE_CONTEXT, value);
            }
            Some(Err(err)) => tracing::warn!(error = %err, "could not encode trace header"),
            None => tracing::debug!("no valid span context, trace header not set"),
        }

        if let Some(completion) = &self.completion {
            completion.complete();
        }
    }
}

/// Instruments `builder` with the global tracer.
pub fn instrument_app(builder: GobletBuilder) -> GobletBuilder {
    GobletInstrumentor::global().instrument_app(builder)
}
