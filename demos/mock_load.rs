use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use tracing_kafka_hook::formatter::default_formatter;
use tracing_kafka_hook::init::{init_tracing_with_config, LayerConfig};
use tracing_kafka_hook::layer::KafkaHook;
use tracing_kafka_hook::mock::{ErrorReporter, MockProducer};
use tracing_kafka_hook::producer::AsyncProducer;
use tracing_kafka_hook::record::Fields;

struct PrintReporter;

impl ErrorReporter for PrintReporter {
    fn report(&self, message: String) {
        eprintln!("mock producer: {message}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let n: u64 = 100_000;

    let producer = Arc::new(MockProducer::new(Arc::new(PrintReporter))?);
    for _ in 0..n {
        producer.expect_input_and_succeed();
    }

    let (hook, drain) = KafkaHook::builder()
        .formatter(default_formatter(Fields::new()))
        .producer(producer.clone())
        .build()?;
    init_tracing_with_config(
        hook,
        LayerConfig {
            enable_stdout: false,
        },
    )?;

    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, "mock load test error");
    }

    producer.close()?;
    let elapsed = start.elapsed();
    println!(
        "mock producer: published {} events in {:?} (~{:.0} ev/s)",
        producer.received(),
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    if let Some(drain) = drain {
        drain.wait().await?;
    }
    Ok(())
}
