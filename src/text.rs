use crate::formatter::{format_time, prefix_field_clashes, FieldMap, FormatError, Formatter};
use crate::record::LogEntry;
use serde_json::{Map, Value};
use std::fmt::Write;

/// Plain `key=value` formatter; the hook's fallback when no formatter is set.
///
/// ```text
/// time="2018-04-20T04:03:00Z" level=info msg="Hello World" user=alice
/// ```
#[derive(Debug, Clone, Default)]
pub struct TextFormatter {
    pub timestamp_format: Option<String>,
    pub disable_timestamp: bool,
}

impl Formatter for TextFormatter {
    fn format(&self, entry: &LogEntry) -> Result<Vec<u8>, FormatError> {
        let keys = FieldMap::default();
        let mut data: Map<String, Value> = entry
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        prefix_field_clashes(&mut data, &keys);

        let mut line = String::new();
        if !self.disable_timestamp {
            let time = format_time(&entry.time, self.timestamp_format.as_deref())?;
            append_pair(&mut line, &keys.time, &time)?;
        }
        append_pair(&mut line, &keys.level, entry.level.as_str())?;
        if !entry.message.is_empty() {
            append_pair(&mut line, &keys.msg, &entry.message)?;
        }
        for (key, value) in &data {
            match value {
                Value::String(s) => append_pair(&mut line, key, s)?,
                Value::Null => append_pair(&mut line, key, "<nil>")?,
                other => append_pair(&mut line, key, &other.to_string())?,
            }
        }
        line.push('\n');
        Ok(line.into_bytes())
    }
}

fn append_pair(line: &mut String, key: &str, value: &str) -> std::fmt::Result {
    if !line.is_empty() {
        line.push(' ');
    }
    if needs_quoting(value) {
        write!(line, "{key}={value:?}")
    } else {
        write!(line, "{key}={value}")
    }
}

fn needs_quoting(text: &str) -> bool {
    !text
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '/' | '@' | '^' | '+'))
}
