//! Hook and producer settings from a DSN or the environment.
//!
//! These are convenience helpers; the hook and producer types stay usable
//! without them.

use crate::formatter::default_formatter;
use crate::kafka::{client_config, Compression, KafkaProducer, RequiredAcks, TlsConfig, DEFAULT_INPUT_BUFFER};
use crate::layer::{HookBuilder, KafkaHook, DEFAULT_TOPIC};
use crate::producer::ProducerError;
use crate::record::{Fields, Level, ALL_LEVELS};

/// Comma-separated broker list, e.g. `broker1:9092,broker2:9092`.
pub const LOG_KAFKA_BROKERS_ENV: &str = "LOG_KAFKA_BROKERS";

/// Target topic.
pub const LOG_KAFKA_TOPIC_ENV: &str = "LOG_KAFKA_TOPIC";

/// Compression codec: `none`, `gzip`, `snappy`, `lz4` or `zstd`.
pub const LOG_KAFKA_COMPRESSION_ENV: &str = "LOG_KAFKA_COMPRESSION";

/// Required acknowledgements: `0`, `1` or `all`.
pub const LOG_KAFKA_ACKS_ENV: &str = "LOG_KAFKA_ACKS";

/// Least severe level that is still published.
pub const LOG_KAFKA_MIN_LEVEL_ENV: &str = "LOG_KAFKA_MIN_LEVEL";

/// Optional CA bundle location; setting any TLS variable enables TLS.
pub const LOG_KAFKA_TLS_CA_ENV: &str = "LOG_KAFKA_TLS_CA";

/// Optional client certificate location.
pub const LOG_KAFKA_TLS_CERT_ENV: &str = "LOG_KAFKA_TLS_CERT";

/// Optional client key location.
pub const LOG_KAFKA_TLS_KEY_ENV: &str = "LOG_KAFKA_TLS_KEY";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Error type returned when reading a [`KafkaConfig`].
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown or unsupported DSN scheme")]
    UnknownScheme,

    #[error("no kafka brokers configured")]
    MissingBrokers,

    #[error("unknown compression codec: {0}")]
    InvalidCompression(String),

    #[error("invalid required acks: {0}")]
    InvalidAcks(String),

    #[error("invalid log level: {0}")]
    InvalidLevel(String),

    #[error("unknown DSN option: {0}")]
    UnknownOption(String),
}

/// Everything needed to build a producer and a hook publishing through it.
#[derive(Debug, Clone, PartialEq)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub compression: Compression,
    pub acks: RequiredAcks,
    pub input_buffer: usize,
    pub tls: Option<TlsConfig>,
    pub levels: Vec<Level>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        KafkaConfig {
            brokers: Vec::new(),
            topic: DEFAULT_TOPIC.to_string(),
            compression: Compression::default(),
            acks: RequiredAcks::default(),
            input_buffer: DEFAULT_INPUT_BUFFER,
            tls: None,
            levels: ALL_LEVELS.to_vec(),
        }
    }
}

impl KafkaConfig {
    /// Parse a DSN of the form
    /// `kafka://broker1:9092,broker2:9092/topic?compression=snappy&acks=all&min_level=warning`.
    ///
    /// The topic defaults to `logs` when the path is empty.
    pub fn from_dsn(dsn: &str) -> Result<Self, ConfigError> {
        let lower = dsn.to_ascii_lowercase();
        if !lower.starts_with("kafka://") {
            return Err(ConfigError::UnknownScheme);
        }

        let without_scheme = &dsn["kafka://".len()..];
        let (location, query) = match without_scheme.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (without_scheme, None),
        };
        let (brokers, topic) = match location.split_once('/') {
            Some((brokers, topic)) => (brokers, topic),
            None => (location, ""),
        };

        let mut config = KafkaConfig {
            brokers: split_brokers(brokers)?,
            ..KafkaConfig::default()
        };
        if !topic.is_empty() {
            config.topic = topic.to_string();
        }

        for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            match key {
                "compression" => config.compression = parse_compression(value)?,
                "acks" => config.acks = parse_acks(value)?,
                "min_level" => config.levels = parse_min_level(value)?,
                "input_buffer" => {
                    config.input_buffer = value
                        .parse()
                        .map_err(|_| ConfigError::UnknownOption(pair.to_string()))?
                }
                _ => return Err(ConfigError::UnknownOption(pair.to_string())),
            }
        }

        Ok(config)
    }

    /// Read the `LOG_KAFKA_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = KafkaConfig {
            brokers: split_brokers(&env_or(LOG_KAFKA_BROKERS_ENV, ""))?,
            topic: env_or(LOG_KAFKA_TOPIC_ENV, DEFAULT_TOPIC),
            compression: parse_compression(&env_or(LOG_KAFKA_COMPRESSION_ENV, "none"))?,
            acks: parse_acks(&env_or(LOG_KAFKA_ACKS_ENV, "1"))?,
            ..KafkaConfig::default()
        };

        if let Ok(level) = std::env::var(LOG_KAFKA_MIN_LEVEL_ENV) {
            config.levels = parse_min_level(&level)?;
        }

        let tls = TlsConfig {
            ca_location: std::env::var(LOG_KAFKA_TLS_CA_ENV).ok(),
            certificate_location: std::env::var(LOG_KAFKA_TLS_CERT_ENV).ok(),
            key_location: std::env::var(LOG_KAFKA_TLS_KEY_ENV).ok(),
            key_password: None,
        };
        if tls != TlsConfig::default() {
            config.tls = Some(tls);
        }

        Ok(config)
    }

    /// Create the producer described by this configuration.
    pub fn producer(&self) -> Result<KafkaProducer, ProducerError> {
        tracing::info!(
            brokers = %self.brokers.join(","),
            compression = self.compression.as_str(),
            acks = self.acks.as_str(),
            tls = self.tls.is_some(),
            "creating kafka producer"
        );
        let config = client_config(&self.brokers, self.compression, self.acks, self.tls.as_ref());
        KafkaProducer::new(&config, self.input_buffer)
    }

    /// A hook builder with this topic and level set and the default
    /// structured formatter carrying `fields`.
    pub fn hook_builder(&self, fields: Fields) -> HookBuilder {
        KafkaHook::builder()
            .topic(self.topic.clone())
            .levels(self.levels.clone())
            .formatter(default_formatter(fields))
    }
}

fn split_brokers(list: &str) -> Result<Vec<String>, ConfigError> {
    let brokers: Vec<String> = list
        .split(',')
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .collect();
    if brokers.is_empty() {
        return Err(ConfigError::MissingBrokers);
    }
    Ok(brokers)
}

fn parse_compression(value: &str) -> Result<Compression, ConfigError> {
    value.parse().map_err(ConfigError::InvalidCompression)
}

fn parse_acks(value: &str) -> Result<RequiredAcks, ConfigError> {
    value.parse().map_err(ConfigError::InvalidAcks)
}

fn parse_min_level(value: &str) -> Result<Vec<Level>, ConfigError> {
    value
        .parse::<Level>()
        .map(Level::and_above)
        .map_err(|_| ConfigError::InvalidLevel(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsn_with_brokers_and_topic() {
        let config = KafkaConfig::from_dsn("kafka://b1:9092,b2:9092/app_logs").unwrap();
        assert_eq!(config.brokers, vec!["b1:9092".to_string(), "b2:9092".to_string()]);
        assert_eq!(config.topic, "app_logs");
        assert_eq!(config.compression, Compression::None);
        assert_eq!(config.acks, RequiredAcks::WaitForLocal);
        assert_eq!(config.levels, ALL_LEVELS.to_vec());
    }

    #[test]
    fn dsn_defaults_topic_and_reads_options() {
        let config = KafkaConfig::from_dsn(
            "KAFKA://localhost:9092?compression=snappy&acks=all&min_level=warn&input_buffer=64",
        )
        .unwrap();
        assert_eq!(config.topic, "logs");
        assert_eq!(config.compression, Compression::Snappy);
        assert_eq!(config.acks, RequiredAcks::WaitForAll);
        assert_eq!(config.input_buffer, 64);
        assert_eq!(
            config.levels,
            vec![Level::Panic, Level::Fatal, Level::Error, Level::Warn]
        );
    }

    #[test]
    fn dsn_errors() {
        assert_eq!(
            KafkaConfig::from_dsn("postgres://localhost/db"),
            Err(ConfigError::UnknownScheme)
        );
        assert_eq!(
            KafkaConfig::from_dsn("kafka:///logs"),
            Err(ConfigError::MissingBrokers)
        );
        assert_eq!(
            KafkaConfig::from_dsn("kafka://b:9092/t?compression=brotli"),
            Err(ConfigError::InvalidCompression("brotli".to_string()))
        );
        assert_eq!(
            KafkaConfig::from_dsn("kafka://b:9092/t?min_level=loud"),
            Err(ConfigError::InvalidLevel("loud".to_string()))
        );
        assert_eq!(
            KafkaConfig::from_dsn("kafka://b:9092/t?retries=3"),
            Err(ConfigError::UnknownOption("retries=3".to_string()))
        );
    }

    #[test]
    fn hook_builder_carries_topic_and_levels() {
        let config = KafkaConfig::from_dsn("kafka://b:9092/audit?min_level=error").unwrap();
        let (hook, drain) = config.hook_builder(Fields::new()).build().unwrap();
        assert_eq!(hook.topic(), "audit");
        assert_eq!(hook.levels(), &[Level::Panic, Level::Fatal, Level::Error]);
        assert!(drain.is_none());
    }
}
