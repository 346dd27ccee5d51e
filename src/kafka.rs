use crate::producer::{AsyncProducer, InputQueue, InputWorker, ProducerError, ProducerMessage};
use crossbeam_channel::Sender;
use rdkafka::config::ClientConfig;
use rdkafka::message::Message;
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use rdkafka::ClientContext;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// How long the client may batch messages before sending them.
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// Default capacity of the input queue.
pub const DEFAULT_INPUT_BUFFER: usize = 256;

const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Compression codec applied to message batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Snappy => "snappy",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
        }
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            "snappy" => Ok(Compression::Snappy),
            "lz4" => Ok(Compression::Lz4),
            "zstd" => Ok(Compression::Zstd),
            _ => Err(s.to_string()),
        }
    }
}

/// Acknowledgement the leader must collect before a write counts as done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequiredAcks {
    NoResponse,
    #[default]
    WaitForLocal,
    WaitForAll,
}

impl RequiredAcks {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequiredAcks::NoResponse => "0",
            RequiredAcks::WaitForLocal => "1",
            RequiredAcks::WaitForAll => "all",
        }
    }
}

impl FromStr for RequiredAcks {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "0" | "none" => Ok(RequiredAcks::NoResponse),
            "1" | "local" => Ok(RequiredAcks::WaitForLocal),
            "-1" | "all" => Ok(RequiredAcks::WaitForAll),
            _ => Err(s.to_string()),
        }
    }
}

/// TLS material for the broker connection, as file locations.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TlsConfig {
    pub ca_location: Option<String>,
    pub certificate_location: Option<String>,
    pub key_location: Option<String>,
    pub key_password: Option<String>,
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("ca_location", &self.ca_location)
            .field("certificate_location", &self.certificate_location)
            .field("key_location", &self.key_location)
            .field("key_password", &self.key_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Build the client configuration used by [`simple_producer`].
pub fn client_config(
    brokers: &[String],
    compression: Compression,
    acks: RequiredAcks,
    tls: Option<&TlsConfig>,
) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", brokers.join(","))
        .set("compression.type", compression.as_str())
        .set("acks", acks.as_str())
        .set("linger.ms", FLUSH_INTERVAL.as_millis().to_string());

    if let Some(tls) = tls {
        config.set("security.protocol", "ssl");
        let locations = [
            ("ssl.ca.location", &tls.ca_location),
            ("ssl.certificate.location", &tls.certificate_location),
            ("ssl.key.location", &tls.key_location),
            ("ssl.key.password", &tls.key_password),
        ];
        for (key, value) in locations {
            if let Some(value) = value {
                config.set(key, value);
            }
        }
    }

    config
}

/// Create a [`KafkaProducer`] from a minimal set of settings.
///
/// `brokers` are `host:port` pairs. The client batches for
/// [`FLUSH_INTERVAL`] before sending.
pub fn simple_producer(
    brokers: &[String],
    compression: Compression,
    acks: RequiredAcks,
    tls: Option<&TlsConfig>,
) -> Result<KafkaProducer, ProducerError> {
    KafkaProducer::new(
        &client_config(brokers, compression, acks, tls),
        DEFAULT_INPUT_BUFFER,
    )
}

/// Forwards failed delivery reports to the error channel.
struct DeliveryReporter {
    errors: UnboundedSender<ProducerError>,
}

impl ClientContext for DeliveryReporter {}

impl ProducerContext for DeliveryReporter {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _: Self::DeliveryOpaque) {
        if let Err((err, msg)) = result {
            let message = ProducerMessage {
                topic: msg.topic().to_string(),
                key: msg.key().map(<[u8]>::to_vec).unwrap_or_default(),
                value: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            };
            let _ = self.errors.send(ProducerError::Delivery {
                message,
                source: Box::new(err.clone()),
            });
        }
    }
}

/// [`AsyncProducer`] backed by an rdkafka [`ThreadedProducer`].
///
/// A dedicated thread moves messages from the bounded input queue into the
/// client. Failures to enqueue and failed delivery reports are both sent to
/// the error channel.
pub struct KafkaProducer {
    queue: InputQueue,
    errors: Mutex<Option<UnboundedReceiver<ProducerError>>>,
}

impl KafkaProducer {
    /// Create the client and start the input thread.
    pub fn new(config: &ClientConfig, input_buffer: usize) -> Result<Self, ProducerError> {
        let (errors_tx, errors_rx) = unbounded_channel();
        let producer: ThreadedProducer<DeliveryReporter> = config
            .create_with_context(DeliveryReporter {
                errors: errors_tx.clone(),
            })
            .map_err(ProducerError::Client)?;

        let queue = InputQueue::spawn(
            "kafka-hook-input",
            input_buffer,
            ClientWorker {
                producer,
                errors: errors_tx,
            },
        )?;

        tracing::debug!(input_buffer, "kafka producer started");

        Ok(KafkaProducer {
            queue,
            errors: Mutex::new(Some(errors_rx)),
        })
    }
}

impl AsyncProducer for KafkaProducer {
    fn input(&self) -> &Sender<ProducerMessage> {
        self.queue.sender()
    }

    fn take_errors(&self) -> Option<UnboundedReceiver<ProducerError>> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    fn close(&self) -> Result<(), ProducerError> {
        self.queue.close()
    }
}

impl Drop for KafkaProducer {
    fn drop(&mut self) {
        if let Err(err) = self.queue.close() {
            eprintln!("[tracing-kafka-hook:ERROR] {err}");
        }
    }
}

struct ClientWorker {
    producer: ThreadedProducer<DeliveryReporter>,
    errors: UnboundedSender<ProducerError>,
}

impl InputWorker for ClientWorker {
    fn publish(&mut self, msg: ProducerMessage) {
        let record = BaseRecord::<[u8], [u8]>::to(&msg.topic)
            .key(msg.key.as_slice())
            .payload(msg.value.as_slice());

        let sent = self.producer.send(record).map_err(|(err, _)| err);
        if let Err(err) = sent {
            let _ = self.errors.send(ProducerError::Enqueue {
                message: msg,
                source: err,
            });
        }
    }

    fn finish(self) {
        if let Err(err) = self.producer.flush(CLOSE_FLUSH_TIMEOUT) {
            let _ = self.errors.send(ProducerError::Flush(err));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brokers() -> Vec<String> {
        vec!["127.0.0.1:9092".to_string(), "127.0.0.1:9093".to_string()]
    }

    #[test]
    fn client_config_applies_defaults() {
        let config = client_config(&brokers(), Compression::Snappy, RequiredAcks::WaitForLocal, None);
        assert_eq!(config.get("bootstrap.servers"), Some("127.0.0.1:9092,127.0.0.1:9093"));
        assert_eq!(config.get("compression.type"), Some("snappy"));
        assert_eq!(config.get("acks"), Some("1"));
        assert_eq!(config.get("linger.ms"), Some("500"));
        assert_eq!(config.get("security.protocol"), None);
    }

    #[test]
    fn client_config_with_tls() {
        let tls = TlsConfig {
            ca_location: Some("fixtures/ca.pem".to_string()),
            certificate_location: Some("fixtures/client.cer.pem".to_string()),
            key_location: Some("fixtures/client.key.pem".to_string()),
            key_password: None,
        };
        let config = client_config(&brokers(), Compression::None, RequiredAcks::WaitForAll, Some(&tls));
        assert_eq!(config.get("security.protocol"), Some("ssl"));
        assert_eq!(config.get("ssl.ca.location"), Some("fixtures/ca.pem"));
        assert_eq!(config.get("ssl.key.location"), Some("fixtures/client.key.pem"));
        assert_eq!(config.get("ssl.key.password"), None);
        assert_eq!(config.get("acks"), Some("all"));
    }

    #[test]
    fn tls_password_is_redacted() {
        let tls = TlsConfig {
            key_password: Some("hunter2".to_string()),
            ..TlsConfig::default()
        };
        assert!(!format!("{tls:?}").contains("hunter2"));
    }

    #[test]
    fn codec_and_acks_parse() {
        assert_eq!("LZ4".parse::<Compression>(), Ok(Compression::Lz4));
        assert_eq!("brotli".parse::<Compression>(), Err("brotli".to_string()));
        assert_eq!("-1".parse::<RequiredAcks>(), Ok(RequiredAcks::WaitForAll));
        assert_eq!("0".parse::<RequiredAcks>(), Ok(RequiredAcks::NoResponse));
    }

    #[test]
    fn producer_without_broker_queues_and_closes() {
        // Client creation does not contact the brokers.
        let producer = simple_producer(&brokers(), Compression::None, RequiredAcks::NoResponse, None)
            .unwrap();
        let mut errors = producer.take_errors().unwrap();
        assert!(producer.take_errors().is_none());

        producer.close().unwrap();
        producer.close().unwrap();
        assert!(producer
            .input()
            .send(ProducerMessage {
                topic: "logs".to_string(),
                key: b"k".to_vec(),
                value: b"v".to_vec(),
            })
            .is_err());

        // The error channel closes once the client is gone.
        while errors.blocking_recv().is_some() {}
    }
}
