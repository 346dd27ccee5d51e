use crate::layer::KafkaHook;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Error returned when the global subscriber cannot be installed.
#[derive(thiserror::Error, Debug)]
#[error("failed to install global tracing subscriber: {0}")]
pub struct InitError(#[from] SetGlobalDefaultError);

/// Конфигурация глобального subscriber'а.
///
/// **Поля**
/// - `enable_stdout`: если `true`, поверх [`KafkaHook`] добавляется
///   `tracing_subscriber::fmt::Layer` и события печатаются в консоль.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            enable_stdout: true,
        }
    }
}

/// Install a [`Registry`] with `hook` as the global default subscriber.
///
/// **Parameters**
/// - `hook`: a built [`KafkaHook`]; its levels decide which events are
///   published.
/// - `config`: [`LayerConfig`] controlling the extra console output.
///
/// **Errors**
///
/// Fails if a global subscriber has already been set.
pub fn init_tracing_with_config(hook: KafkaHook, config: LayerConfig) -> Result<(), InitError> {
    // Хук подключается всегда; `fmt`‑слой только при `enable_stdout = true`.
    // Для совместимости типов собираем subscriber в двух вариантах.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(hook).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = Registry::default().with(hook);
        tracing::subscriber::set_global_default(subscriber)?;
    }
    Ok(())
}

/// Equivalent to [`init_tracing_with_config`] with [`LayerConfig::default`].
pub fn init_tracing(hook: KafkaHook) -> Result<(), InitError> {
    init_tracing_with_config(hook, LayerConfig::default())
}
