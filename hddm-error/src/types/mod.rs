pub mod decode;
pub mod field;
pub mod transport;

// Публичный экспорт всех типов ошибок из вложенных
// модулей, чтобы упростить доступ к ним из внешнего кода.
pub use decode::*;
pub use field::*;
pub use transport::*;

use crate::{ErrorExt, StatusCode};

/// Универсальная ошибка с кодом и сообщением.
#[derive(Debug, Clone)]
pub struct GenericError {
    code: StatusCode,
    message: String,
}

impl GenericError {
    pub fn new(
        code: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for GenericError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GenericError {}

impl ErrorExt for GenericError {
    fn status_code(&self) -> StatusCode {
        self.code
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Конвертация из std::io::Error
///
/// Таймаут сокета на Unix приходит как `WouldBlock`, поэтому он тоже
/// считается таймаутом.
impl From<std::io::Error> for crate::StackError {
    fn from(err: std::io::Error) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected => StatusCode::ConnectFailed,
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => StatusCode::Timeout,
            std::io::ErrorKind::UnexpectedEof => StatusCode::TruncatedStream,
            _ => StatusCode::Io,
        };

        crate::StackError::new(GenericError::new(code, err.to_string()))
    }
}

/// Конвертация из std::str::Utf8Error
impl From<std::str::Utf8Error> for crate::StackError {
    fn from(err: std::str::Utf8Error) -> Self {
        crate::StackError::new(GenericError::new(
            StatusCode::SchemaMismatch,
            format!("UTF-8 decoding failed: {err}"),
        ))
    }
}

/// Форматирует необязательный offset для сообщений об ошибках.
pub(crate) fn fmt_offset(offset: &Option<u64>) -> String {
    match offset {
        Some(o) => format!(" [offset: 0x{o:X}]"),
        None => String::new(),
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
