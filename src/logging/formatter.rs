use std::io::{self, Stderr};

use tracing_subscriber::{fmt, layer::Layer as LayerTrait, registry::LookupSpan};

use crate::logging::config::{LogFormat, LoggingConfig};

/// Слой форматирования. Boxed, чтобы стереть конкретный тип формата.
///
/// Логи идут в stderr: stdout занят выводом событий.
pub fn build_formatter_from_config<S>(config: &LoggingConfig) -> Box<dyn LayerTrait<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let writer: fn() -> Stderr = io::stderr;
    let base = fmt::layer()
        .with_writer(writer)
        .with_ansi(config.with_ansi && config.format != LogFormat::Json)
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids)
        .with_thread_names(config.with_thread_ids);

    match config.format {
        LogFormat::Json => Box::new(base.event_format(fmt::format().json().with_current_span(true))),
        LogFormat::Pretty => Box::new(base.event_format(fmt::format().pretty())),
        LogFormat::Compact => Box::new(base.event_format(fmt::format().compact())),
    }
}
