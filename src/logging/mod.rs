//! Логирование для бинарника и демо.
//!
//! Библиотека только пишет события через `tracing`; подписчик
//! устанавливает приложение через [`init_logging`].

pub mod config;
mod filters;
mod formatter;

pub use config::{LogFormat, LoggingConfig};
use hddm_error::{GenericError, HddmResult, StatusCode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Устанавливает глобальный подписчик. `RUST_LOG` имеет приоритет над
/// уровнем из конфигурации.
pub fn init_logging(config: &LoggingConfig) -> HddmResult<()> {
    let env_filter = filters::build_filter_from_config(config);
    let layer = formatter::build_formatter_from_config(config);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .map_err(|e| {
            GenericError::new(
                StatusCode::InvalidConfig,
                format!("failed to install log subscriber: {e}"),
            )
        })?;

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        format = %config.format,
        "Logging initialized"
    );
    Ok(())
}
