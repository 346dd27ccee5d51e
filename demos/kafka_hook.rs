use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use tracing_kafka_hook::config::{env_or, KafkaConfig};
use tracing_kafka_hook::init::init_tracing;
use tracing_kafka_hook::producer::AsyncProducer;
use tracing_kafka_hook::record::Fields;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dsn = env_or("LOG_KAFKA_DSN", "kafka://127.0.0.1:9092/logs?min_level=info");
    let config = KafkaConfig::from_dsn(&dsn)?;

    let producer = Arc::new(config.producer()?);

    let mut fields = Fields::new();
    fields.insert("service".to_string(), Value::from("auth"));

    let (hook, drain) = config
        .hook_builder(fields)
        .producer(producer.clone())
        .build()?;
    init_tracing(hook)?;

    info!("starting service");

    warn!(attempts = 3, "slow login");

    error!(
        user_id = 42,
        reason = "invalid password",
        "authentication failed"
    );

    // Delivers what is still queued and ends the drain task.
    producer.close()?;
    if let Some(drain) = drain {
        drain.wait().await?;
    }
    Ok(())
}
