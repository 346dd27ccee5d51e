#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use tracing_kafka_hook::mock::ErrorReporter;
use tracing_kafka_hook::{DiagnosticSink, FormatError, LogEntry, ProducerError};

/// Collects everything a mock producer complains about.
#[derive(Default)]
pub struct RecordingReporter {
    messages: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, message: String) {
        self.messages.lock().unwrap().push(message);
    }
}

/// Collects producer errors handed to the drain task.
#[derive(Default)]
pub struct RecordingDiagnostics {
    errors: Mutex<Vec<String>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl DiagnosticSink for RecordingDiagnostics {
    fn report(&self, err: &ProducerError) {
        self.errors.lock().unwrap().push(err.to_string());
    }
}

/// Formats an entry as its bare message.
pub fn echo(entry: &LogEntry) -> Result<Vec<u8>, FormatError> {
    Ok(entry.message.clone().into_bytes())
}
