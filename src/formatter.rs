//! Entry-to-bytes formatting.
//!
//! [`Formatter`] is the seam between the hook and the wire payload. The
//! [`StructuredFormatter`] adds default fields to every entry before handing
//! a scratch copy to an inner formatter, leaving the caller's entry alone.

use crate::json::JsonFormatter;
use crate::pool::EntryPool;
use crate::record::{Fields, LogEntry};
use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{self, Write};

/// RFC 3339 with nanoseconds padded to nine digits, so that every timestamp
/// rendered in one offset has the same length. UTC is written as `Z`.
pub const RFC3339_NANO_FIXED: &str = "%Y-%m-%dT%H:%M:%S%.9f%:z";

/// Key under which the default formatter writes the entry time.
pub const TIMESTAMP_KEY: &str = "@timestamp";
/// Key under which the default formatter writes the entry message.
pub const MESSAGE_KEY: &str = "message";

/// Baseline defaults added by [`default_formatter`] unless overridden.
pub const BASELINE_FIELDS: [(&str, &str); 2] = [("@version", "1"), ("type", "log")];

/// Turns a [`LogEntry`] into the payload published on the topic.
pub trait Formatter: Send + Sync {
    fn format(&self, entry: &LogEntry) -> Result<Vec<u8>, FormatError>;
}

impl<F> Formatter for F
where
    F: Fn(&LogEntry) -> Result<Vec<u8>, FormatError> + Send + Sync,
{
    fn format(&self, entry: &LogEntry) -> Result<Vec<u8>, FormatError> {
        self(entry)
    }
}

/// Output key names for the three built-in record attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    pub time: String,
    pub msg: String,
    pub level: String,
}

impl Default for FieldMap {
    fn default() -> Self {
        FieldMap {
            time: "time".to_string(),
            msg: "msg".to_string(),
            level: "level".to_string(),
        }
    }
}

/// Move entry fields that would be overwritten by a built-in attribute to
/// `fields.<name>`.
pub(crate) fn prefix_field_clashes(data: &mut Map<String, Value>, map: &FieldMap) {
    for key in [&map.time, &map.msg, &map.level] {
        if let Some(value) = data.remove(key.as_str()) {
            data.insert(format!("fields.{key}"), value);
        }
    }
}

/// Render `time` with a chrono strftime pattern, or as RFC 3339 with second
/// precision when no pattern is given. A bad pattern is an error.
pub(crate) fn format_time(
    time: &DateTime<FixedOffset>,
    pattern: Option<&str>,
) -> Result<String, FormatError> {
    match pattern {
        // `%:z` never yields `Z`.
        Some(pattern) if pattern == RFC3339_NANO_FIXED => {
            Ok(time.to_rfc3339_opts(SecondsFormat::Nanos, true))
        }
        Some(pattern) => {
            let mut out = String::new();
            write!(out, "{}", time.format(pattern))?;
            Ok(out)
        }
        None => Ok(time.to_rfc3339_opts(SecondsFormat::Secs, true)),
    }
}

/// Error produced by a [`Formatter`].
///
/// Displays exactly like the error it wraps, which is also its source.
pub struct FormatError(Box<dyn Error + Send + Sync>);

impl FormatError {
    pub fn new(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        FormatError(err.into())
    }

    pub fn into_inner(self) -> Box<dyn Error + Send + Sync> {
        self.0
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FormatError").field(&self.0).finish()
    }
}

impl Error for FormatError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&*self.0)
    }
}

impl From<serde_json::Error> for FormatError {
    fn from(err: serde_json::Error) -> Self {
        FormatError::new(err)
    }
}

impl From<fmt::Error> for FormatError {
    fn from(err: fmt::Error) -> Self {
        FormatError::new(err)
    }
}

/// Formatter that merges a fixed set of default fields into each entry.
///
/// Entry fields win over defaults with the same name. The merge happens on a
/// pooled scratch copy; the entry passed to [`Formatter::format`] is only
/// read.
pub struct StructuredFormatter<F = JsonFormatter> {
    inner: F,
    fields: Fields,
    pool: EntryPool,
}

impl<F: Formatter> StructuredFormatter<F> {
    /// Wrap `inner`, adding `fields` exactly as given.
    pub fn new(inner: F, fields: Fields) -> Self {
        StructuredFormatter {
            inner,
            fields,
            pool: EntryPool::default(),
        }
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

impl<F: Formatter> Formatter for StructuredFormatter<F> {
    fn format(&self, entry: &LogEntry) -> Result<Vec<u8>, FormatError> {
        let scratch = self.pool.copy_with_defaults(entry, &self.fields);
        self.inner.format(&scratch)
    }
}

/// The default structured formatter.
///
/// JSON output with `@timestamp` (fixed-width nanoseconds) and `message`
/// keys, plus `@version` = `"1"` and `type` = `"log"` unless `fields`
/// already sets them.
pub fn default_formatter(mut fields: Fields) -> StructuredFormatter<JsonFormatter> {
    for (key, value) in BASELINE_FIELDS {
        fields
            .entry(key.to_string())
            .or_insert_with(|| Value::from(value));
    }

    let json = JsonFormatter {
        timestamp_format: Some(RFC3339_NANO_FIXED.to_string()),
        field_map: FieldMap {
            time: TIMESTAMP_KEY.to_string(),
            msg: MESSAGE_KEY.to_string(),
            ..FieldMap::default()
        },
        ..JsonFormatter::default()
    };

    StructuredFormatter::new(json, fields)
}
