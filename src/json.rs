use crate::formatter::{format_time, prefix_field_clashes, FieldMap, FormatError, Formatter};
use crate::record::LogEntry;
use serde_json::{Map, Value};

/// Formats an entry as a single JSON object followed by a newline.
///
/// Output keys are sorted. Example with the default settings:
///
/// ```json
/// {"level":"info","msg":"Hello World","time":"2018-04-20T04:03:00Z","user":"alice"}
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    /// chrono strftime pattern for the time attribute; RFC 3339 when `None`.
    pub timestamp_format: Option<String>,
    pub disable_timestamp: bool,
    pub field_map: FieldMap,
    /// Nest all entry fields under this key instead of the top level.
    pub data_key: Option<String>,
    pub pretty_print: bool,
}

impl Formatter for JsonFormatter {
    fn format(&self, entry: &LogEntry) -> Result<Vec<u8>, FormatError> {
        let mut data: Map<String, Value> = entry
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if let Some(key) = &self.data_key {
            let nested = std::mem::take(&mut data);
            data.insert(key.clone(), Value::Object(nested));
        }

        prefix_field_clashes(&mut data, &self.field_map);

        if !self.disable_timestamp {
            let time = format_time(&entry.time, self.timestamp_format.as_deref())?;
            data.insert(self.field_map.time.clone(), Value::String(time));
        }
        data.insert(self.field_map.msg.clone(), Value::String(entry.message.clone()));
        data.insert(self.field_map.level.clone(), serde_json::to_value(entry.level)?);

        let mut out = if self.pretty_print {
            serde_json::to_vec_pretty(&data)?
        } else {
            serde_json::to_vec(&data)?
        };
        out.push(b'\n');
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Level;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn entry() -> LogEntry {
        LogEntry::new(Level::Info, "Hello World")
            .with_time(Utc.with_ymd_and_hms(2018, 4, 20, 4, 3, 0).unwrap().fixed_offset())
            .with_field("user", "alice")
    }

    #[test]
    fn default_layout() {
        let out = JsonFormatter::default().format(&entry()).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"level\":\"info\",\"msg\":\"Hello World\",\"time\":\"2018-04-20T04:03:00Z\",\"user\":\"alice\"}\n"
        );
    }

    #[test]
    fn clashing_entry_field_is_kept_under_prefix() {
        let e = entry().with_field("level", "custom");
        let out: Value = serde_json::from_slice(&JsonFormatter::default().format(&e).unwrap()).unwrap();
        assert_eq!(out["level"], "info");
        assert_eq!(out["fields.level"], "custom");
    }

    #[test]
    fn data_key_nests_fields() {
        let formatter = JsonFormatter {
            data_key: Some("data".to_string()),
            disable_timestamp: true,
            ..JsonFormatter::default()
        };
        let out: Value = serde_json::from_slice(&formatter.format(&entry()).unwrap()).unwrap();
        assert_eq!(out, json!({"data": {"user": "alice"}, "level": "info", "msg": "Hello World"}));
    }

    #[test]
    fn pretty_print_is_still_newline_terminated() {
        let formatter = JsonFormatter {
            pretty_print: true,
            ..JsonFormatter::default()
        };
        let out = formatter.format(&entry()).unwrap();
        assert!(out.ends_with(b"}\n"));
        assert!(out.iter().filter(|b| **b == b'\n').count() > 1);
    }
}
