//! `tracing` layer that publishes log entries to a Kafka topic.
//!
//! Entries are formatted (by default as JSON with `@timestamp`, `message`,
//! `@version` and `type` fields), keyed by their timestamp and queued on an
//! asynchronous producer. Delivery failures are drained in the background
//! into a [`DiagnosticSink`].

pub mod record;
pub mod key;
pub mod pool;
pub mod formatter;
pub mod json;
pub mod text;
pub mod producer;
pub mod kafka;
pub mod drain;
pub mod layer;
pub mod mock;
pub mod config;
pub mod init;

pub use config::{ConfigError, KafkaConfig};
pub use drain::{drain_errors, DiagnosticSink, DrainError, DrainHandle, StderrDiagnostics};
pub use formatter::{default_formatter, FormatError, Formatter, StructuredFormatter};
pub use init::{init_tracing, init_tracing_with_config, InitError, LayerConfig};
pub use json::JsonFormatter;
pub use kafka::{simple_producer, Compression, KafkaProducer, RequiredAcks, TlsConfig};
pub use layer::{HookBuilder, HookError, KafkaHook};
pub use producer::{AsyncProducer, ProducerError, ProducerMessage};
pub use record::{Fields, Level, LogEntry};
pub use text::TextFormatter;
