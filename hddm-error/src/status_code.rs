use std::fmt;

use num_enum::TryFromPrimitive;

/// Коды статуса для категоризации ошибок.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Доступ к полям событий (не завершают поток)
/// - 6xxx: Транспорт / IO
/// - 8xxx: Декодирование контейнера
///
/// `num_enum::TryFromPrimitive` даёт нативную реализацию `TryFrom<u32>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unsupported = 1001,
    Unexpected = 1002,
    Internal = 1003,
    InvalidArgs = 1004,
    InvalidConfig = 1005,

    // === 2xxx: Поля событий ===
    FieldNotPresent = 2000,
    FieldKindMismatch = 2001,

    // === 6xxx: Транспорт/IO ===
    Io = 6000,
    UnsupportedScheme = 6001,
    AddressError = 6002,
    ConnectFailed = 6003,
    Timeout = 6004,
    Cancelled = 6005,

    // === 8xxx: Декодирование ===
    TruncatedStream = 8000,
    CorruptLength = 8001,
    SchemaMismatch = 8002,
    InvalidHeader = 8003,
    UnsupportedVersion = 8004,
    IntegrityMismatch = 8005,
    Decompression = 8006,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Имеет ли смысл повторить открытие потока (внешней обёрткой retry).
    ///
    /// Ядро само никогда не повторяет операции.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectFailed | Self::Timeout)
    }

    /// Завершает ли ошибка с этим кодом текущий поток.
    ///
    /// Ошибки доступа к полям (2xxx) — обычный исход, поток продолжается.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Self::Success | Self::FieldNotPresent | Self::FieldKindMismatch
        )
    }

    /// Ошибка транспортного уровня (диапазон 6xxx).
    pub fn is_transport_error(&self) -> bool {
        (6000..=6999).contains(&self.code())
    }

    /// Ошибка декодирования контейнера (диапазон 8xxx).
    pub fn is_decode_error(&self) -> bool {
        (8000..=8999).contains(&self.code())
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::FieldNotPresent | Self::FieldKindMismatch => LogLevel::Debug,
            Self::Cancelled => LogLevel::Info,
            Self::ConnectFailed | Self::Timeout | Self::Io => LogLevel::Warn,
            Self::Internal | Self::Unexpected => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что повторять имеет смысл только сбои подключения.
    #[test]
    fn test_retryable() {
        assert!(StatusCode::ConnectFailed.is_retryable());
        assert!(StatusCode::Timeout.is_retryable());
        assert!(!StatusCode::TruncatedStream.is_retryable());
        assert!(!StatusCode::UnsupportedScheme.is_retryable());
    }

    /// Тест проверяет, что ошибки полей не завершают поток, а ошибки
    /// транспорта и декодирования — завершают.
    #[test]
    fn test_terminal_codes() {
        assert!(!StatusCode::FieldNotPresent.is_terminal());
        assert!(!StatusCode::FieldKindMismatch.is_terminal());
        assert!(StatusCode::TruncatedStream.is_terminal());
        assert!(StatusCode::ConnectFailed.is_terminal());
        assert!(StatusCode::Cancelled.is_terminal());
    }

    /// Тест проверяет разделение диапазонов транспорта и декодирования.
    #[test]
    fn test_ranges() {
        assert!(StatusCode::AddressError.is_transport_error());
        assert!(!StatusCode::AddressError.is_decode_error());
        assert!(StatusCode::SchemaMismatch.is_decode_error());
        assert!(!StatusCode::SchemaMismatch.is_transport_error());
    }

    /// Тест проверяет конвертацию через `TryFrom<u32>`.
    #[test]
    fn test_try_from_u32() {
        let n = StatusCode::CorruptLength.code();
        assert_eq!(StatusCode::try_from(n).unwrap(), StatusCode::CorruptLength);
        assert!(StatusCode::try_from(99999).is_err());
    }

    /// Тест проверяет получение числового представления и конвертацию
    /// `From<StatusCode> for u32`.
    #[test]
    fn test_code_and_into() {
        let c = StatusCode::TruncatedStream;
        assert_eq!(c.code(), 8000);
        let n: u32 = c.into();
        assert_eq!(n, 8000);
    }

    /// Тест проверяет отображаемый уровень логирования для разных кодов.
    #[test]
    fn test_log_level_mappings() {
        assert_eq!(StatusCode::Success.log_level(), LogLevel::Trace);
        assert_eq!(StatusCode::FieldNotPresent.log_level(), LogLevel::Debug);
        assert_eq!(StatusCode::Internal.log_level(), LogLevel::Error);
        assert_eq!(StatusCode::Cancelled.log_level(), LogLevel::Info);
        assert_eq!(StatusCode::TruncatedStream.log_level(), LogLevel::Warn);
    }

    /// Тест проверяет формат `Display` — строка должна содержать имя варианта и
    /// числовой код.
    #[test]
    fn test_display_contains_name_and_code() {
        let s = format!("{}", StatusCode::SchemaMismatch);
        assert!(s.contains("8002"), "Display must contain code, got: {s}");
        assert!(
            s.contains("SchemaMismatch"),
            "Display must contain variant name, got: {s}"
        );
    }
}
