use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки открытия и чтения источника байт.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Схема локатора не входит в таблицу диспетчеризации.
    #[error("Unsupported scheme '{scheme}' in locator '{locator}'")]
    UnsupportedScheme { scheme: String, locator: String },

    /// Некорректный хост, порт или путь.
    #[error("Malformed address '{locator}': {reason}")]
    AddressError { locator: String, reason: String },

    /// Не удалось открыть соединение или ресурс.
    #[error("Failed to connect to {address}: {reason}")]
    ConnectFailed { address: String, reason: String },

    /// Сбой чтения из уже открытого источника.
    #[error("Read from {address} failed at offset {offset}: {reason}")]
    ReadFailed {
        address: String,
        offset: u64,
        reason: String,
    },

    /// Истёк таймаут подключения или чтения.
    #[error("Timed out during {operation} on {address}")]
    Timeout { address: String, operation: String },

    /// Операция не поддерживается транспортом.
    #[error("{operation} is not supported by {scheme} sources")]
    Unsupported {
        operation: &'static str,
        scheme: &'static str,
    },

    /// Запрошено закрытие источника во время операции.
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },
}

impl ErrorExt for TransportError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::UnsupportedScheme { .. } => StatusCode::UnsupportedScheme,
            Self::AddressError { .. } => StatusCode::AddressError,
            Self::ConnectFailed { .. } => StatusCode::ConnectFailed,
            Self::ReadFailed { .. } => StatusCode::Io,
            Self::Timeout { .. } => StatusCode::Timeout,
            Self::Unsupported { .. } => StatusCode::Unsupported,
            Self::Cancelled { .. } => StatusCode::Cancelled,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "transport".to_string()),
            ("status_code", self.status_code().to_string()),
        ];

        match self {
            Self::ConnectFailed { address, .. }
            | Self::ReadFailed { address, .. }
            | Self::Timeout { address, .. } => {
                tags.push(("address", address.clone()));
            }
            Self::UnsupportedScheme { scheme, .. } => {
                tags.push(("scheme", scheme.clone()));
            }
            _ => {}
        }

        tags
    }
}

impl TransportError {
    /// Ошибка отмены для указанной операции.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
