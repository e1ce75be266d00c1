//! Конфигурация потока чтения.
//!
//! [`StreamConfig`] — явная структура, которую передаёт вызывающий код.
//! Библиотека сама окружение не читает; для загрузки из переменных
//! `HDDM_*` есть [`StreamSettings`].

pub mod settings;

use std::{fmt, sync::Arc, time::Duration};

use hddm_error::{ensure, HddmResult, StatusCode};
pub use settings::StreamSettings;

use crate::{format::FrameLimits, transport::ResourceLocator};

/// Таймаут подключения по умолчанию.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Таймаут чтения по умолчанию.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
/// Максимальная длина записи по умолчанию (64 МиБ).
pub const DEFAULT_MAX_RECORD_LENGTH: u32 = 64 * 1024 * 1024;
/// Размер блока удалённого чтения по умолчанию (1 МиБ).
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;
/// Глубина упреждающего чтения HTTP по умолчанию.
pub const DEFAULT_READAHEAD: usize = 3;
/// Верхняя граница глубины упреждающего чтения.
pub const MAX_READAHEAD: usize = 64;

/// Учётные данные транспорта.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// HTTP Basic
    Basic { username: String, password: String },
    /// HTTP `Authorization: Bearer`
    Bearer(String),
    /// Только имя пользователя (логин XRootD)
    User(String),
}

/// Хук, выдающий учётные данные для конкретного локатора.
pub trait CredentialProvider: Send + Sync {
    fn credentials(
        &self,
        locator: &ResourceLocator,
    ) -> Option<Credentials>;
}

/// Параметры открытия и чтения потока.
#[derive(Clone)]
pub struct StreamConfig {
    /// Таймаут подключения; ноль означает значение по умолчанию
    pub connect_timeout: Duration,
    /// Таймаут одного чтения; ноль означает значение по умолчанию
    pub read_timeout: Duration,
    /// Верхняя граница длины фрейма и распакованной записи
    pub max_record_length: u32,
    pub credentials: Option<Arc<dyn CredentialProvider>>,
    /// Размер блока для HTTP и XRootD
    pub block_size: usize,
    /// Сколько блоков HTTP запрашивать заранее
    pub readahead: usize,
    pub verify_tls: bool,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StreamConfig {
    pub fn with_credentials<P>(
        mut self,
        provider: P,
    ) -> Self
    where
        P: CredentialProvider + 'static,
    {
        self.credentials = Some(Arc::new(provider));
        self
    }

    /// Таймаут подключения с учётом значения по умолчанию.
    pub fn effective_connect_timeout(&self) -> Duration {
        if self.connect_timeout.is_zero() {
            DEFAULT_CONNECT_TIMEOUT
        } else {
            self.connect_timeout
        }
    }

    /// Таймаут чтения с учётом значения по умолчанию.
    pub fn effective_read_timeout(&self) -> Duration {
        if self.read_timeout.is_zero() {
            DEFAULT_READ_TIMEOUT
        } else {
            self.read_timeout
        }
    }

    /// Учётные данные для локатора, если задан провайдер.
    pub fn credentials_for(
        &self,
        locator: &ResourceLocator,
    ) -> Option<Credentials> {
        self.credentials
            .as_ref()
            .and_then(|p| p.credentials(locator))
    }

    pub fn frame_limits(&self) -> FrameLimits {
        FrameLimits {
            max_record_length: self.max_record_length,
        }
    }

    /// Проверяет значения, которые нельзя исправить молча.
    pub fn validate(&self) -> HddmResult<()> {
        ensure!(
            self.max_record_length > 0,
            StatusCode::InvalidConfig,
            "max_record_length must be positive"
        );
        ensure!(
            self.max_record_length < u32::MAX,
            StatusCode::InvalidConfig,
            "max_record_length collides with the end-of-stream sentinel"
        );
        ensure!(
            self.block_size > 0,
            StatusCode::InvalidConfig,
            "block_size must be positive"
        );
        ensure!(
            self.readahead <= MAX_READAHEAD,
            StatusCode::InvalidConfig,
            "readahead {} exceeds {}",
            self.readahead,
            MAX_READAHEAD
        );
        Ok(())
    }
}

impl Credentials {
    /// Имя пользователя, если оно есть.
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Basic { username, .. } | Self::User(username) => Some(username),
            Self::Bearer(_) => None,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_record_length: DEFAULT_MAX_RECORD_LENGTH,
            credentials: None,
            block_size: DEFAULT_BLOCK_SIZE,
            readahead: DEFAULT_READAHEAD,
            verify_tls: true,
        }
    }
}

impl fmt::Debug for StreamConfig {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("StreamConfig")
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("max_record_length", &self.max_record_length)
            .field("credentials", &self.credentials.as_ref().map(|_| "<provider>"))
            .field("block_size", &self.block_size)
            .field("readahead", &self.readahead)
            .field("verify_tls", &self.verify_tls)
            .finish()
    }
}

impl CredentialProvider for Credentials {
    fn credentials(
        &self,
        _locator: &ResourceLocator,
    ) -> Option<Credentials> {
        Some(self.clone())
    }
}

// Секреты в логах не печатаются.
impl fmt::Debug for Credentials {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"***").finish(),
            Self::User(u) => f.debug_tuple("User").field(u).finish(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что нулевые таймауты заменяются значениями по
    /// умолчанию.
    #[test]
    fn test_zero_timeouts_fall_back() {
        let cfg = StreamConfig {
            connect_timeout: Duration::ZERO,
            read_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(cfg.effective_connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(cfg.effective_read_timeout(), DEFAULT_READ_TIMEOUT);

        let cfg = StreamConfig {
            read_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        assert_eq!(cfg.effective_read_timeout(), Duration::from_secs(2));
    }

    /// Тест проверяет валидацию конфигурации.
    #[test]
    fn test_validate() {
        assert!(StreamConfig::default().validate().is_ok());

        let cfg = StreamConfig {
            block_size: 0,
            ..Default::default()
        };
        assert!(cfg.validate().unwrap_err().is(StatusCode::InvalidConfig));

        let cfg = StreamConfig {
            max_record_length: u32::MAX,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = StreamConfig {
            readahead: MAX_READAHEAD + 1,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    /// Тест проверяет, что секреты не попадают в Debug.
    #[test]
    fn test_credentials_debug_redacted() {
        let basic = Credentials::Basic {
            username: "gluex".to_string(),
            password: "hunter2".to_string(),
        };
        let s = format!("{basic:?}");
        assert!(s.contains("gluex"));
        assert!(!s.contains("hunter2"));

        let cfg = StreamConfig::default().with_credentials(Credentials::Bearer("tok".into()));
        assert!(!format!("{cfg:?}").contains("tok\""));

        let loc = ResourceLocator::parse("http://h/x").unwrap();
        assert_eq!(
            cfg.credentials_for(&loc),
            Some(Credentials::Bearer("tok".into()))
        );
    }
}
