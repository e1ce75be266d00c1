use tracing_subscriber::EnvFilter;

use crate::logging::config::LoggingConfig;

/// Фильтр событий: `RUST_LOG`, если задан, иначе директива из конфигурации.
pub fn build_filter_from_config(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let directive = config.filter_directive();
    match EnvFilter::try_new(&directive) {
        Ok(filter) => filter,
        Err(e) => {
            // Подписчик ещё не установлен, поэтому пишем напрямую в stderr.
            eprintln!("Invalid log filter directive '{directive}': {e}; falling back to 'warn'");
            EnvFilter::new("warn")
        }
    }
}
