mod common;

use common::{echo, RecordingDiagnostics, RecordingReporter};
use serde_json::Value;
use std::error::Error;
use std::sync::Arc;
use tracing_kafka_hook::mock::MockProducer;
use tracing_kafka_hook::{default_formatter, AsyncProducer, Fields, KafkaHook, Level, LogEntry};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

fn expect_value(expected: &'static str) -> tracing_kafka_hook::mock::ValueChecker {
    Box::new(move |value: &[u8]| -> Result<(), Box<dyn Error + Send + Sync>> {
        if value == expected.as_bytes() {
            Ok(())
        } else {
            Err(format!(
                "expected {expected:?}, got {:?}",
                String::from_utf8_lossy(value)
            )
            .into())
        }
    })
}

#[tokio::test]
async fn fire_publishes_formatted_entry() {
    let reporter = RecordingReporter::new();
    let diagnostics = RecordingDiagnostics::new();
    let producer = Arc::new(MockProducer::new(reporter.clone()).unwrap());
    producer.expect_input_with_checker_and_succeed(expect_value("test_data"));

    let (hook, drain) = KafkaHook::builder()
        .topic("success")
        .formatter(echo)
        .producer(producer.clone())
        .diagnostics(diagnostics.clone())
        .build()
        .unwrap();

    hook.fire(&LogEntry::new(Level::Info, "test_data")).unwrap();

    producer.close().unwrap();
    drain.unwrap().wait().await.unwrap();

    assert!(reporter.messages().is_empty());
    assert!(diagnostics.errors().is_empty());
    let sent = producer.messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].topic, "success");
}

#[tokio::test]
async fn delivery_failure_reaches_diagnostics() {
    let reporter = RecordingReporter::new();
    let diagnostics = RecordingDiagnostics::new();
    let producer = Arc::new(MockProducer::new(reporter.clone()).unwrap());
    producer.expect_input_with_checker_and_fail(
        expect_value("test_data"),
        "failed to publish message",
    );

    let (hook, drain) = KafkaHook::builder()
        .topic("failure")
        .formatter(echo)
        .producer(producer.clone())
        .diagnostics(diagnostics.clone())
        .build()
        .unwrap();

    // The hook only queues the message; the failure comes back later.
    hook.fire(&LogEntry::new(Level::Info, "test_data")).unwrap();

    producer.close().unwrap();
    drain.unwrap().wait().await.unwrap();

    assert!(reporter.messages().is_empty());
    assert_eq!(
        diagnostics.errors(),
        vec!["failed to produce message to topic failure: failed to publish message".to_string()]
    );
}

#[tokio::test]
async fn layer_respects_configured_levels() {
    let reporter = RecordingReporter::new();
    let producer = Arc::new(MockProducer::new(reporter.clone()).unwrap());
    producer.expect_input_and_succeed();

    let (hook, drain) = KafkaHook::builder()
        .levels(vec![Level::Warn, Level::Error, Level::Fatal, Level::Panic])
        .formatter(echo)
        .producer(producer.clone())
        .build()
        .unwrap();

    let subscriber = Registry::default().with(hook);
    tracing::subscriber::with_default(subscriber, || {
        tracing::debug!("debug event");
        tracing::warn!("warn event");
    });

    producer.close().unwrap();
    drain.unwrap().wait().await.unwrap();

    let sent = producer.messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].value, b"warn event".to_vec());
    assert!(reporter.messages().is_empty());
}

#[tokio::test]
async fn layer_publishes_structured_json() {
    let reporter = RecordingReporter::new();
    let producer = Arc::new(MockProducer::new(reporter.clone()).unwrap());
    producer.expect_input_and_succeed();

    let mut defaults = Fields::new();
    defaults.insert("service".to_string(), Value::from("billing"));
    defaults.insert("user_id".to_string(), Value::from("default"));

    let (hook, drain) = KafkaHook::builder()
        .formatter(default_formatter(defaults))
        .producer(producer.clone())
        .build()
        .unwrap();

    let subscriber = Registry::default().with(hook);
    tracing::subscriber::with_default(subscriber, || {
        tracing::error!(user_id = 42, retry = true, "payment declined");
    });

    producer.close().unwrap();
    drain.unwrap().wait().await.unwrap();

    let sent = producer.messages();
    assert_eq!(sent.len(), 1);
    let out: Value = serde_json::from_slice(&sent[0].value).unwrap();
    assert_eq!(out["message"], "payment declined");
    assert_eq!(out["level"], "error");
    assert_eq!(out["service"], "billing");
    assert_eq!(out["user_id"], 42);
    assert_eq!(out["retry"], true);
    assert_eq!(out["@version"], "1");
    assert_eq!(out["type"], "log");
    assert!(out["@timestamp"].as_str().is_some());
    // Keyed by the binary timestamp.
    assert_eq!(sent[0].key.len(), 15);
}

#[test]
fn fire_without_producer_fails_for_any_entry() {
    let (hook, drain) = KafkaHook::builder()
        .formatter(default_formatter(Fields::new()))
        .build()
        .unwrap();
    assert!(drain.is_none());

    for level in [Level::Debug, Level::Error] {
        let err = hook.fire(&LogEntry::new(level, "anything")).unwrap_err();
        assert_eq!(err.to_string(), "no producer defined");
    }
}

#[test]
fn concurrent_fire_keeps_entries_apart() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 50;

    let reporter = RecordingReporter::new();
    let diagnostics = RecordingDiagnostics::new();
    let producer = Arc::new(MockProducer::new(reporter.clone()).unwrap());
    for _ in 0..THREADS * PER_THREAD {
        producer.expect_input_and_succeed();
    }

    let mut defaults = Fields::new();
    defaults.insert("service".to_string(), Value::from("billing"));
    let (hook, drain) = KafkaHook::builder()
        .formatter(default_formatter(defaults))
        .producer(producer.clone())
        .diagnostics(diagnostics.clone())
        .build()
        .unwrap();
    let hook = Arc::new(hook);

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let hook = Arc::clone(&hook);
            std::thread::spawn(move || {
                for n in 0..PER_THREAD {
                    let mut entry = LogEntry::new(Level::Info, format!("{t}-{n}"))
                        .with_field("thread", t as u64)
                        .with_field("seq", n as u64);
                    if n % 2 == 1 {
                        entry = entry.with_field("odd", true);
                    }
                    hook.fire(&entry).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    producer.close().unwrap();
    drain.unwrap().join().unwrap();

    assert_eq!(producer.received(), THREADS * PER_THREAD);
    assert!(reporter.messages().is_empty());
    assert!(diagnostics.errors().is_empty());

    for message in producer.messages() {
        let out: Value = serde_json::from_slice(&message.value).unwrap();
        let (t, n) = out["message"].as_str().unwrap().split_once('-').unwrap();
        let n: u64 = n.parse().unwrap();
        assert_eq!(out["thread"], t.parse::<u64>().unwrap());
        assert_eq!(out["seq"], n);
        assert_eq!(out["odd"].as_bool(), (n % 2 == 1).then_some(true));
        assert_eq!(out["service"], "billing");

        let mut keys: Vec<&str> = out.as_object().unwrap().keys().map(String::as_str).collect();
        keys.retain(|k| *k != "odd");
        assert_eq!(
            keys,
            vec!["@timestamp", "@version", "level", "message", "seq", "service", "thread", "type"]
        );
    }
}
