use crate::drain::{drain_errors, DiagnosticSink, DrainError, DrainHandle, StderrDiagnostics};
use crate::formatter::{FormatError, Formatter};
use crate::key::MessageKey;
use crate::producer::{AsyncProducer, ProducerMessage};
use crate::record::{Fields, Level, LogEntry, ALL_LEVELS};
use crate::text::TextFormatter;
use chrono::Utc;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Topic used when none is configured.
pub const DEFAULT_TOPIC: &str = "logs";

/// Event targets never republished, so the hook cannot feed on its own output.
const IGNORED_TARGETS: [&str; 2] = ["tracing_kafka_hook", "rdkafka"];

/// Errors returned synchronously by [`KafkaHook::fire`].
#[derive(thiserror::Error, Debug)]
pub enum HookError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("no producer defined")]
    NoProducer,

    #[error("producer input queue is closed")]
    ProducerClosed,

    #[error(transparent)]
    Drain(#[from] DrainError),
}

/// Builder for [`KafkaHook`].
///
/// Defaults: [`TextFormatter`], every level, topic `"logs"`, no producer,
/// producer errors written to stderr.
pub struct HookBuilder {
    formatter: Box<dyn Formatter>,
    levels: Vec<Level>,
    topic: String,
    producer: Option<Arc<dyn AsyncProducer>>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl Default for HookBuilder {
    fn default() -> Self {
        HookBuilder {
            formatter: Box::new(TextFormatter::default()),
            levels: ALL_LEVELS.to_vec(),
            topic: DEFAULT_TOPIC.to_string(),
            producer: None,
            diagnostics: Arc::new(StderrDiagnostics),
        }
    }
}

impl HookBuilder {
    pub fn formatter(mut self, formatter: impl Formatter + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    pub fn levels(mut self, levels: impl Into<Vec<Level>>) -> Self {
        self.levels = levels.into();
        self
    }

    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn producer(mut self, producer: Arc<dyn AsyncProducer>) -> Self {
        self.producer = Some(producer);
        self
    }

    /// Where producer errors end up. Defaults to [`StderrDiagnostics`].
    pub fn diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Finish the hook.
    ///
    /// If a producer is configured and its error channel has not been taken
    /// yet, this starts the drain (see [`drain_errors`]) and returns its
    /// handle. The drain ends when the producer is closed.
    pub fn build(self) -> Result<(KafkaHook, Option<DrainHandle>), HookError> {
        let drain = self
            .producer
            .as_ref()
            .and_then(|producer| producer.take_errors())
            .map(|errors| drain_errors(errors, self.diagnostics))
            .transpose()?;

        tracing::debug!(
            topic = %self.topic,
            levels = ?self.levels,
            producer = self.producer.is_some(),
            "kafka hook built"
        );

        let hook = KafkaHook {
            formatter: self.formatter,
            levels: self.levels,
            topic: self.topic,
            producer: self.producer,
        };
        Ok((hook, drain))
    }
}

/// Publishes log entries to a Kafka topic.
///
/// Usable directly through [`fire`](KafkaHook::fire) or as a
/// `tracing_subscriber` [`Layer`]. Configuration is fixed once built, so
/// `fire` can be called from any number of threads.
pub struct KafkaHook {
    formatter: Box<dyn Formatter>,
    levels: Vec<Level>,
    topic: String,
    producer: Option<Arc<dyn AsyncProducer>>,
}

impl KafkaHook {
    pub fn builder() -> HookBuilder {
        HookBuilder::default()
    }

    /// Levels for which entries are published.
    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn producer(&self) -> Option<&Arc<dyn AsyncProducer>> {
        self.producer.as_ref()
    }

    /// Format `entry` and queue it on the producer.
    ///
    /// Blocks only while the producer's input queue is full. `Ok(())` means
    /// the message was queued, not that the broker has it; delivery failures
    /// go to the diagnostic sink.
    pub fn fire(&self, entry: &LogEntry) -> Result<(), HookError> {
        let key = MessageKey::for_entry(entry);
        let value = self.formatter.format(entry)?;
        let producer = self.producer.as_ref().ok_or(HookError::NoProducer)?;

        let message = ProducerMessage {
            topic: self.topic.clone(),
            key: key.into_bytes(),
            value,
        };
        producer
            .input()
            .send(message)
            .map_err(|_| HookError::ProducerClosed)
    }
}

impl<S> Layer<S> for KafkaHook
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if IGNORED_TARGETS
            .iter()
            .any(|target| meta.target().starts_with(target))
        {
            return;
        }

        let level = Level::from(meta.level());
        if !self.levels.contains(&level) {
            return;
        }

        let mut fields = Fields::new();
        let mut message: Option<String> = None;
        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        let entry = LogEntry {
            time: Utc::now().fixed_offset(),
            level,
            message: message.unwrap_or_default(),
            fields,
        };

        // Events emitted here would come straight back to this layer.
        if let Err(e) = self.fire(&entry) {
            eprintln!("[tracing-kafka-hook:ERROR] failed to fire hook: {e}");
        }
    }
}

/// Collects event fields into [`Fields`], pulling out the `message` field.
pub struct FieldVisitor<'a> {
    pub fields: &'a mut Fields,
    pub message: &'a mut Option<String>,
}

impl FieldVisitor<'_> {
    fn insert(&mut self, field: &Field, value: serde_json::Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.insert(field, serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, serde_json::Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.insert(field, serde_json::Value::String(format!("{:?}", value)));
        }
    }
}
