use std::{collections::HashMap, time::Duration};

use config::{Config, ConfigError, Environment};
use hddm_error::{GenericError, HddmResult, StackError, StatusCode};
use serde::{Deserialize, Serialize};

use super::{
    Credentials, StreamConfig, DEFAULT_BLOCK_SIZE, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_MAX_RECORD_LENGTH, DEFAULT_READAHEAD, DEFAULT_READ_TIMEOUT,
};

/// Префикс переменных окружения.
pub const ENV_PREFIX: &str = "HDDM";

/// Настройки потока в сериализуемом виде.
///
/// Загружаются явно через [`StreamSettings::load`] из значений по умолчанию
/// и переменных `HDDM_*` (например, `HDDM_READ_TIMEOUT_SECS=60`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub max_record_length: u32,
    pub block_size: usize,
    pub readahead: usize,
    pub verify_tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bearer_token: Option<String>,
}

impl StreamSettings {
    /// Загружает настройки из переменных окружения процесса.
    pub fn load() -> HddmResult<Self> {
        Self::build(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .map_err(config_error)
    }

    /// Загружает настройки из явно переданного набора переменных.
    pub fn load_from(vars: HashMap<String, String>) -> HddmResult<Self> {
        Self::build(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(Some(vars)),
        )
        .map_err(config_error)
    }

    fn build(env: Environment) -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            // Значения по умолчанию
            .set_default("connect_timeout_secs", DEFAULT_CONNECT_TIMEOUT.as_secs() as i64)?
            .set_default("read_timeout_secs", DEFAULT_READ_TIMEOUT.as_secs() as i64)?
            .set_default("max_record_length", DEFAULT_MAX_RECORD_LENGTH as i64)?
            .set_default("block_size", DEFAULT_BLOCK_SIZE as i64)?
            .set_default("readahead", DEFAULT_READAHEAD as i64)?
            .set_default("verify_tls", true)?
            // Переменные окружения с префиксом HDDM_
            .add_source(env)
            .build()?;

        cfg.try_deserialize()
    }

    /// Превращает настройки в [`StreamConfig`] и проверяет его.
    pub fn into_stream_config(self) -> HddmResult<StreamConfig> {
        let credentials = match (self.bearer_token, self.username, self.password) {
            (Some(token), _, _) => Some(Credentials::Bearer(token)),
            (None, Some(username), Some(password)) => {
                Some(Credentials::Basic { username, password })
            }
            (None, Some(username), None) => Some(Credentials::User(username)),
            (None, None, _) => None,
        };

        let mut config = StreamConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            max_record_length: self.max_record_length,
            credentials: None,
            block_size: self.block_size,
            readahead: self.readahead,
            verify_tls: self.verify_tls,
        };
        if let Some(creds) = credentials {
            config = config.with_credentials(creds);
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
            read_timeout_secs: DEFAULT_READ_TIMEOUT.as_secs(),
            max_record_length: DEFAULT_MAX_RECORD_LENGTH,
            block_size: DEFAULT_BLOCK_SIZE,
            readahead: DEFAULT_READAHEAD,
            verify_tls: true,
            username: None,
            password: None,
            bearer_token: None,
        }
    }
}

fn config_error(err: ConfigError) -> StackError {
    GenericError::new(StatusCode::InvalidConfig, err.to_string()).into()
}
