use std::{fmt, str::FromStr};

use hddm_error::{GenericError, HddmResult, StatusCode};

/// Формат вывода логов.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Одна строка на событие
    #[default]
    Compact,
    /// Многострочный, для отладки
    Pretty,
    /// JSON-объект на строку
    Json,
}

/// Настройки логирования для бинарников и демо.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Базовый уровень или директива `EnvFilter` (например
    /// `"hddm_stream=debug,info"`)
    pub level: String,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub with_target: bool,
    pub with_thread_ids: bool,
}

impl LoggingConfig {
    /// Уровень по числу флагов `-v` и `-q`: 0 → `warn`, 1 → `info`,
    /// 2 → `debug`, больше → `trace`; `quiet` → `error`.
    pub fn from_verbosity(
        verbose: u8,
        quiet: bool,
    ) -> Self {
        let level = match (quiet, verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "info",
            (false, 2) => "debug",
            _ => "trace",
        };
        Self {
            level: level.to_string(),
            ..Self::default()
        }
    }

    /// Директива фильтра: уровень библиотеки и `warn` для остальных
    /// крейтов, если задан только уровень.
    pub fn filter_directive(&self) -> String {
        if self.level.contains('=') || self.level.contains(',') {
            self.level.clone()
        } else {
            format!("hddm_stream={0},hddm_cat={0},warn", self.level)
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
            with_ansi: true,
            with_target: true,
            with_thread_ids: false,
        }
    }
}

impl FromStr for LogFormat {
    type Err = GenericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(GenericError::new(
                StatusCode::InvalidConfig,
                format!("unknown log format '{other}'"),
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        })
    }
}

/// Разбирает формат из строки (для флагов CLI).
pub fn parse_format(s: &str) -> HddmResult<LogFormat> {
    Ok(s.parse()?)
}
