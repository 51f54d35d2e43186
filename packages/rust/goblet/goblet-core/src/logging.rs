//! Logging setup and Cloud Logging (Stackdriver) structured output.
//!
//! With `stackdriver` enabled every event is written to stdout as one JSON
//! object, which the Cloud Functions host forwards to Cloud Logging with the
//! right severity and labels. The correlation id is taken from the enclosing
//! `invocation` span.

use crate::config::GobletConfig;
use crate::constants::{defaults, env_vars};
use crate::error::GobletError;
use serde::Serialize;
use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::io::Write;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};

const CORRELATION_FIELD: &str = "correlation_id";
const MISSING: &str = "missing";

/// Monitored resource attached to Cloud Logging entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub labels: BTreeMap<String, String>,
}

impl LogResource {
    pub fn cloud_function(function_name: &str, region: &str, correlation_id: Option<&str>) -> Self {
        let labels = BTreeMap::from([
            ("function_name".to_string(), function_name.to_string()),
            ("region".to_string(), region.to_string()),
            (
                CORRELATION_FIELD.to_string(),
                correlation_id.unwrap_or(MISSING).to_string(),
            ),
        ]);
        Self {
            resource_type: "cloud_function".to_string(),
            labels,
        }
    }
}

/// Install the global `tracing` subscriber for the function.
///
/// The filter comes from `RUST_LOG`, then `LOG_LEVEL`, then defaults to `info`.
pub fn init_logging(config: &GobletConfig) -> Result<(), GobletError> {
    let filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = env::var(env_vars::LOG_LEVEL).unwrap_or_else(|_| defaults::LOG_LEVEL.into());
        EnvFilter::try_new(level.to_lowercase())
            .unwrap_or_else(|_| EnvFilter::new(defaults::LOG_LEVEL))
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.stackdriver {
        tracing::subscriber::set_global_default(registry.with(StackdriverLayer::new(
            &config.function_name,
            &config.region,
            std::io::stdout,
        )))
    } else {
        tracing::subscriber::set_global_default(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false),
            ),
        )
    };
    result.map_err(|e| GobletError::Logging(e.to_string()))
}

#[derive(Debug, Clone)]
struct CorrelationId(String);

/// A `tracing` layer writing Cloud Logging structured JSON lines.
pub struct StackdriverLayer<W> {
    function_name: String,
    region: String,
    make_writer: W,
}

impl<W> StackdriverLayer<W>
where
    W: for<'a> MakeWriter<'a> + 'static,
{
    pub fn new(function_name: &str, region: &str, make_writer: W) -> Self {
        Self {
            function_name: function_name.to_string(),
            region: region.to_string(),
            make_writer,
        }
    }

    fn format_event<S>(&self, event: &Event<'_>, ctx: &Context<'_, S>) -> JsonValue
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let correlation_id = ctx.event_scope(event).and_then(|scope| {
            scope
                .into_iter()
                .find_map(|span| span.extensions().get::<CorrelationId>().cloned())
        });
        let resource = LogResource::cloud_function(
            &self.function_name,
            &self.region,
            correlation_id.as_ref().map(|c| c.0.as_str()),
        );

        let metadata = event.metadata();
        let mut entry = Map::new();
        entry.insert(
            "time".to_string(),
            JsonValue::String(chrono::Utc::now().to_rfc3339()),
        );
        entry.insert(
            "severity".to_string(),
            JsonValue::String(severity(metadata.level()).to_string()),
        );
        entry.insert(
            "message".to_string(),
            visitor.message.take().unwrap_or_default(),
        );
        for (key, value) in visitor.fields {
            entry.entry(key).or_insert(value);
        }
        entry.insert(
            "logging.googleapis.com/labels".to_string(),
            json!(resource.labels),
        );
        entry.insert(
            "logging.googleapis.com/sourceLocation".to_string(),
            json!({
                "file": metadata.file(),
                "line": metadata.line().map(|line| line.to_string()),
                "function": metadata.target(),
            }),
        );
        JsonValue::Object(entry)
    }
}

impl<S, W> Layer<S> for StackdriverLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'a> MakeWriter<'a> + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut visitor = CorrelationVisitor::default();
        attrs.record(&mut visitor);
        if let (Some(correlation_id), Some(span)) = (visitor.0, ctx.span(id)) {
            span.extensions_mut().insert(CorrelationId(correlation_id));
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let mut visitor = CorrelationVisitor::default();
        values.record(&mut visitor);
        if let (Some(correlation_id), Some(span)) = (visitor.0, ctx.span(id)) {
            let mut extensions = span.extensions_mut();
            extensions.remove::<CorrelationId>();
            extensions.insert(CorrelationId(correlation_id));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let entry = self.format_event(event, &ctx);
        let mut writer = self.make_writer.make_writer();
        // Logging must never take the invocation down.
        let _ = writeln!(writer, "{}", entry);
    }
}

fn severity(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG | Level::TRACE => "DEBUG",
    }
}

#[derive(Default)]
struct CorrelationVisitor(Option<String>);

impl Visit for CorrelationVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == CORRELATION_FIELD {
            self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == CORRELATION_FIELD {
            self.0 = Some(format!("{:?}", value).trim_matches('"').to_string());
        }
    }
}

#[derive(Default)]
struct JsonVisitor {
    message: Option<JsonValue>,
    fields: Map<String, JsonValue>,
}

impl JsonVisitor {
    fn insert(&mut self, field: &Field, value: JsonValue) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for JsonVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, json!(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, json!(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, json!(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, json!(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, json!(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, json!(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, json!(format!("{:?}", value)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn lines(&self) -> Vec<JsonValue> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    impl io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for SharedBuffer {
        type Writer = SharedBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn subscriber(buffer: SharedBuffer) -> impl Subscriber + Send + Sync {
        tracing_subscriber::registry().with(StackdriverLayer::new("orders", "us-east4", buffer))
    }

    #[test]
    fn test_log_resource_defaults_correlation_id() {
        let resource = LogResource::cloud_function("fn", "us-east4", None);
        assert_eq!(resource.labels["correlation_id"], "missing");
        assert_eq!(
            serde_json::to_value(&resource).unwrap()["type"],
            "cloud_function"
        );
    }

    #[test]
    fn test_structured_entry_inside_invocation() {
        let buffer = SharedBuffer::default();
        tracing::subscriber::with_default(subscriber(buffer.clone()), || {
            let span = tracing::info_span!("invocation", correlation_id = "abc-123");
            let _guard = span.enter();
            tracing::warn!(order = 7, "processing order");
        });

        let lines = buffer.lines();
        assert_eq!(lines.len(), 1);
        let entry = &lines[0];
        assert_eq!(entry["severity"], "WARNING");
        assert_eq!(entry["message"], "processing order");
        assert_eq!(entry["order"], 7);
        let labels = &entry["logging.googleapis.com/labels"];
        assert_eq!(labels["function_name"], "orders");
        assert_eq!(labels["region"], "us-east4");
        assert_eq!(labels["correlation_id"], "abc-123");
        assert!(entry["time"].is_string());
    }

    #[test]
    fn test_structured_entry_outside_invocation() {
        let buffer = SharedBuffer::default();
        tracing::subscriber::with_default(subscriber(buffer.clone()), || {
            tracing::error!("cold start failure");
        });

        let entry = &buffer.lines()[0];
        assert_eq!(entry["severity"], "ERROR");
        assert_eq!(
            entry["logging.googleapis.com/labels"]["correlation_id"],
            "missing"
        );
    }

    #[test]
    fn test_correlation_id_recorded_later() {
        let buffer = SharedBuffer::default();
        tracing::subscriber::with_default(subscriber(buffer.clone()), || {
            let span = tracing::info_span!("invocation", correlation_id = tracing::field::Empty);
            span.record("correlation_id", "late");
            let _guard = span.enter();
            tracing::info!("hello");
        });

        let entry = &buffer.lines()[0];
        assert_eq!(entry["severity"], "INFO");
        assert_eq!(
            entry["logging.googleapis.com/labels"]["correlation_id"],
            "late"
        );
    }
}
