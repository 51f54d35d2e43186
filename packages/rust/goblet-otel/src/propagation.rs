//! Trace header parsing and the Cloud Trace propagator.
//!
//! Google Cloud Functions receive trace context in one of two headers:
//!
//! - `X-Cloud-Trace-Context: TRACE_ID/SPAN_ID;o=OPTIONS`, where `TRACE_ID` is
//!   up to 32 hex characters, `SPAN_ID` is an unsigned 64-bit *decimal*
//!   number and `o=1` marks the request as sampled.
//! - `traceparent: 00-TRACE_ID-SPAN_ID-FLAGS`, the W3C format.
//!
//! [`TraceHeader`] parses either into an OpenTelemetry [`SpanContext`], and
//! [`CloudTraceFormatPropagator`] plugs the Cloud Trace format into the
//! OpenTelemetry propagation API.

use crate::constants::headers::{CLOUD_TRACE_CONTEXT, TRACEPARENT};
use http::HeaderMap;
use lazy_static::lazy_static;
use opentelemetry::{
    propagation::{text_map_propagator::FieldIter, Extractor, Injector, TextMapPropagator},
    trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState},
    Context,
};
use thiserror::Error;

lazy_static! {
    static ref CLOUD_TRACE_FIELDS: [String; 1] = [CLOUD_TRACE_CONTEXT.to_owned()];
}

/// Reasons an incoming trace header could not be used.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TraceHeaderError {
    #[error("request carries neither an X-Cloud-Trace-Context nor a traceparent header")]
    Missing,

    #[error("malformed trace header: {0:?}")]
    Malformed(String),

    #[error("invalid trace id: {0:?}")]
    InvalidTraceId(String),

    #[error("invalid span id: {0:?}")]
    InvalidSpanId(String),
}

/// The header a [`TraceHeader`] was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceHeaderFormat {
    CloudTrace,
    TraceParent,
}

/// A trace header as received, split into its parts.
///
/// `trace_id` and `span_id` keep the textual form of the header: hex for the
/// trace id, decimal (Cloud Trace) or hex (`traceparent`) for the span id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceHeader {
    pub format: TraceHeaderFormat,
    pub trace_id: String,
    pub span_id: String,
    /// `None` when the header carries no sampling decision.
    pub sampled: Option<bool>,
}

impl TraceHeader {
    /// Reads the trace header from a request.
    ///
    /// `X-Cloud-Trace-Context` takes precedence over `traceparent` when both
    /// are present.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, TraceHeaderError> {
        if let Some(value) = headers.get(CLOUD_TRACE_CONTEXT) {
            let value = value
                .to_str()
                .map_err(|_| TraceHeaderError::Malformed(format!("{:?}", value)))?;
            return Self::parse_cloud_trace(value);
        }
        if let Some(value) = headers.get(TRACEPARENT) {
            let value = value
                .to_str()
                .map_err(|_| TraceHeaderError::Malformed(format!("{:?}", value)))?;
            return Self::parse_traceparent(value);
        }
        Err(TraceHeaderError::Missing)
    }

    /// Parses `TRACE_ID/SPAN_ID[;o=OPTIONS]`.
    pub fn parse_cloud_trace(value: &str) -> Result<Self, TraceHeaderError> {
        let value = value.trim();
        let (trace_id, rest) = value
            .split_once('/')
            .ok_or_else(|| TraceHeaderError::Malformed(value.to_string()))?;
        let (span_id, options) = match rest.split_once(';') {
            Some((span_id, options)) => (span_id, Some(options)),
            None => (rest, None),
        };
        let sampled = match options.map(str::trim) {
            Some("o=1") => Some(true),
            Some("o=0") => Some(false),
            _ => None,
        };

        let header = Self {
            format: TraceHeaderFormat::CloudTrace,
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            sampled,
        };
        header.span_context()?;
        Ok(header)
    }

    /// Parses `VERSION-TRACE_ID-SPAN_ID-FLAGS`.
    pub fn parse_traceparent(value: &str) -> Result<Self, TraceHeaderError> {
        let value = value.trim();
        let parts: Vec<&str> = value.split('-').collect();
        if parts.len() < 4 || parts[0].len() != 2 || parts[0] == "ff" {
            return Err(TraceHeaderError::Malformed(value.to_string()));
        }
        if parts[1].len() != 32 {
            return Err(TraceHeaderError::InvalidTraceId(parts[1].to_string()));
        }
        if parts[2].len() != 16 {
            return Err(TraceHeaderError::InvalidSpanId(parts[2].to_string()));
        }
        let flags = u8::from_str_radix(parts[3], 16)
            .map_err(|_| TraceHeaderError::Malformed(value.to_string()))?;

        let header = Self {
            format: TraceHeaderFormat::TraceParent,
            trace_id: parts[1].to_string(),
            span_id: parts[2].to_string(),
            sampled: Some(flags & 0x01 == 0x01),
        };
        header.span_context()?;
        Ok(header)
    }

    /// Builds the remote span context described by this header.
    ///
    /// A header without a sampling decision is treated as sampled.
    pub fn span_context(&self) -> Result<SpanContext, TraceHeaderError> {
        let trace_id = parse_trace_id(&self.trace_id)?;
        let radix = match self.format {
            TraceHeaderFormat::CloudTrace => 10,
            TraceHeaderFormat::TraceParent => 16,
        };
        let span_id = parse_span_id(&self.span_id, radix)?;
        let flags = match self.sampled {
            Some(false) => TraceFlags::default(),
            _ => TraceFlags::SAMPLED,
        };
        Ok(SpanContext::new(
            trace_id,
            span_id,
            flags,
            true,
            TraceState::default(),
        ))
    }
}

fn parse_trace_id(value: &str) -> Result<TraceId, TraceHeaderError> {
    let invalid = || TraceHeaderError::InvalidTraceId(value.to_string());
    if value.is_empty() || value.len() > 32 || !value.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    match u128::from_str_radix(value, 16) {
        Ok(0) | Err(_) => Err(invalid()),
        Ok(id) => Ok(TraceId::from_bytes(id.to_be_bytes())),
    }
}

fn parse_span_id(value: &str, radix: u32) -> Result<SpanId, TraceHeaderError> {
    let invalid = || TraceHeaderError::InvalidSpanId(value.to_string());
    if value.is_empty() || !value.chars().all(|c| c.is_digit(radix)) {
        return Err(invalid());
    }
    match u64::from_str_radix(value, radix) {
        Ok(0) | Err(_) => Err(invalid()),
        Ok(id) => Ok(SpanId::from_bytes(id.to_be_bytes())),
    }
}

/// Formats a span context as an `X-Cloud-Trace-Context` value.
pub fn format_cloud_trace(span_context: &SpanContext) -> String {
    let trace_id = u128::from_be_bytes(span_context.trace_id().to_bytes());
    let span_id = u64::from_be_bytes(span_context.span_id().to_bytes());
    let sampled = if span_context.is_sampled() { 1 } else { 0 };
    format!("{:032x}/{};o={}", trace_id, span_id, sampled)
}

/// Propagates trace context in the `X-Cloud-Trace-Context` format.
///
/// Combine it with [`TraceContextPropagator`](opentelemetry_sdk::propagation::TraceContextPropagator)
/// in a `TextMapCompositePropagator` to accept both header styles.
#[derive(Clone, Debug, Default)]
pub struct CloudTraceFormatPropagator {
    _private: (),
}

impl CloudTraceFormatPropagator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TextMapPropagator for CloudTraceFormatPropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let span = cx.span();
        let span_context = span.span_context();
        if span_context.is_valid() {
            injector.set(CLOUD_TRACE_CONTEXT, format_cloud_trace(span_context));
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        let Some(value) = extractor.get(CLOUD_TRACE_CONTEXT) else {
            return cx.clone();
        };
        match TraceHeader::parse_cloud_trace(value).and_then(|header| header.span_context()) {
            Ok(span_context) => cx.with_remote_span_context(span_context),
            Err(err) => {
                tracing::debug!(error = %err, "ignoring unusable Cloud Trace header");
                cx.clone()
            }
        }
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(CLOUD_TRACE_FIELDS.as_ref())
    }
}
