//! Span processor that buffers spans for the duration of an invocation.
//!
//! Cloud Functions throttle the CPU as soon as the response is written, so
//! background exporters such as `BatchSpanProcessor` may never get to run.
//! [`InvocationSpanProcessor`] only queues finished spans and exports them when
//! [`force_flush`](SpanProcessor::force_flush) is called, which
//! [`TelemetryCompletionHandler::complete`](crate::TelemetryCompletionHandler::complete)
//! does at the end of every invocation.
//!
//! # Configuration
//!
//! - `GOBLET_SPAN_PROCESSOR_QUEUE_SIZE`: maximum number of queued spans
//!   (default 2048). Spans finished while the queue is full are dropped.
//! - `GOBLET_SPAN_PROCESSOR_BATCH_SIZE`: maximum spans per export call
//!   (default 512).
//!
//! Exporters are driven with `futures_executor::block_on`, so HTTP exporters
//! must use a blocking client.

use crate::constants::{defaults, env_vars};
use bon::bon;
use opentelemetry::Context;
use opentelemetry_sdk::{
    error::{OTelSdkError, OTelSdkResult},
    trace::{Span, SpanData, SpanExporter, SpanProcessor},
    Resource,
};
use std::collections::VecDeque;
use std::env;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};

/// Bounded FIFO of finished spans.
#[derive(Debug)]
struct SpanQueue {
    spans: VecDeque<SpanData>,
    capacity: usize,
}

impl SpanQueue {
    fn new(capacity: usize) -> Self {
        Self {
            spans: VecDeque::with_capacity(capacity.min(defaults::QUEUE_SIZE)),
            capacity,
        }
    }

    /// Returns `false` when the queue is full and the span was not added.
    fn push(&mut self, span: SpanData) -> bool {
        if self.spans.len() >= self.capacity {
            return false;
        }
        self.spans.push_back(span);
        true
    }

    fn take_batch(&mut self, max: usize) -> Vec<SpanData> {
        let count = self.spans.len().min(max.max(1));
        self.spans.drain(..count).collect()
    }

    fn len(&self) -> usize {
        self.spans.len()
    }

    fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

/// A span processor that exports on flush only.
///
/// ```
/// use goblet_otel::InvocationSpanProcessor;
/// # use opentelemetry_sdk::{error::OTelSdkResult, trace::{SpanData, SpanExporter}};
/// # #[derive(Debug)]
/// # struct NoopExporter;
/// # impl SpanExporter for NoopExporter {
/// #     fn export(&self, _: Vec<SpanData>)
/// #         -> std::pin::Pin<Box<dyn std::future::Future<Output = OTelSdkResult> + Send>> {
/// #         Box::pin(async { Ok(()) })
/// #     }
/// #     fn shutdown(&mut self) -> OTelSdkResult { Ok(()) }
/// # }
///
/// let processor = InvocationSpanProcessor::builder()
///     .exporter(NoopExporter)
///     .max_queue_size(1000)
///     .max_batch_size(100)
///     .build();
/// ```
#[derive(Debug)]
pub struct InvocationSpanProcessor<E>
where
    E: SpanExporter + std::fmt::Debug,
{
    exporter: Mutex<E>,
    queue: Mutex<SpanQueue>,
    is_shutdown: AtomicBool,
    dropped_count: AtomicUsize,
    max_batch_size: usize,
}

#[bon]
impl<E> InvocationSpanProcessor<E>
where
    E: SpanExporter + std::fmt::Debug,
{
    fn env_or(name: &str, default: usize) -> usize {
        env::var(name)
            .ok()
            .and_then(|value| value.parse().ok())
            .filter(|value| *value > 0)
            .unwrap_or(default)
    }

    /// Creates a processor. Unset sizes fall back to the environment, then
    /// to the defaults.
    #[builder]
    pub fn new(exporter: E, max_batch_size: Option<usize>, max_queue_size: Option<usize>) -> Self {
        let max_batch_size = max_batch_size
            .unwrap_or_else(|| Self::env_or(env_vars::BATCH_SIZE, defaults::BATCH_SIZE));
        let max_queue_size = max_queue_size
            .unwrap_or_else(|| Self::env_or(env_vars::QUEUE_SIZE, defaults::QUEUE_SIZE));

        Self {
            exporter: Mutex::new(exporter),
            queue: Mutex::new(SpanQueue::new(max_queue_size)),
            is_shutdown: AtomicBool::new(false),
            dropped_count: AtomicUsize::new(0),
            max_batch_size,
        }
    }

    /// Number of spans dropped because the queue was full or the processor
    /// was shut down.
    pub fn dropped_spans(&self) -> usize {
        self.dropped_count.load(Ordering::Relaxed)
    }

    /// Number of spans waiting for the next flush.
    pub fn queued_spans(&self) -> usize {
        self.queue.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    fn record_drop(&self, reason: &'static str) {
        let dropped = self.dropped_count.fetch_add(1, Ordering::Relaxed) + 1;
        if dropped == 1 || dropped % 100 == 0 {
            tracing::warn!(dropped_spans = dropped, reason, "dropping span");
        }
    }
}

impl<E> SpanProcessor for InvocationSpanProcessor<E>
where
    E: SpanExporter + std::fmt::Debug,
{
    fn on_start(&self, _span: &mut Span, _cx: &Context) {}

    fn on_end(&self, span: SpanData) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            self.record_drop("processor is shut down");
            return;
        }
        if !span.span_context.is_sampled() {
            return;
        }

        match self.queue.lock() {
            Ok(mut queue) => {
                if !queue.push(span) {
                    drop(queue);
                    self.record_drop("queue is full");
                }
            }
            Err(_) => tracing::warn!("span queue lock poisoned, dropping span"),
        }
    }

    fn force_flush(&self) -> OTelSdkResult {
        let mut exporter = self
            .exporter
            .lock()
            .map_err(|_| OTelSdkError::InternalFailure("exporter lock poisoned".to_string()))?;

        // The queue lock is only held while draining a batch, so `on_end`
        // never waits on an export.
        loop {
            let batch = {
                let mut queue = self.queue.lock().map_err(|_| {
                    OTelSdkError::InternalFailure("span queue lock poisoned".to_string())
                })?;
                queue.take_batch(self.max_batch_size)
            };
            if batch.is_empty() {
                return Ok(());
            }

            tracing::debug!(spans = batch.len(), "flushing spans");
            if let Err(err) = futures_executor::block_on(exporter.export(batch)) {
                tracing::warn!(error = ?err, "span export failed");
                return Err(err);
            }
        }
    }

    fn shutdown(&self) -> OTelSdkResult {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(OTelSdkError::AlreadyShutdown);
        }
        self.force_flush()?;
        let mut exporter = self
            .exporter
            .lock()
            .map_err(|_| OTelSdkError::InternalFailure("exporter lock poisoned".to_string()))?;
        exporter.shutdown()
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(exporter) = self.exporter.get_mut() {
            exporter.set_resource(resource);
        }
    }
}
