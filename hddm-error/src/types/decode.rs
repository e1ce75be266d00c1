use std::any::Any;

use thiserror::Error;

use super::fmt_offset;
use crate::{ErrorExt, StatusCode};

/// Ошибки декодирования контейнера: заголовок, фреймы, дерево записи.
///
/// Любая из них переводит поток в состояние `Failed`.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// Данные закончились раньше, чем объявлено (никогда не путается с
    /// концом потока).
    #[error("Truncated stream: {context} (expected {expected} bytes, got {got}){}", fmt_offset(.offset))]
    TruncatedStream {
        context: String,
        offset: Option<u64>,
        expected: u64,
        got: u64,
    },

    /// Объявленная длина не согласуется с доступными байтами или лимитом.
    #[error("Corrupt length for {what}: declared {declared}, available {available}{}", fmt_offset(.offset))]
    CorruptLength {
        what: String,
        declared: u64,
        available: u64,
        offset: Option<u64>,
    },

    /// Неизвестный тег или нарушение схемы.
    #[error("Schema mismatch: {reason}{}", fmt_offset(.offset))]
    SchemaMismatch { reason: String, offset: Option<u64> },

    /// Неверный magic, маркер порядка байт или флаги.
    #[error("Invalid container header: {reason}")]
    InvalidHeader { reason: String },

    /// Версия формата не распознана.
    #[error("Unsupported format version {found} (supported: {supported:?})")]
    UnsupportedVersion { found: u8, supported: Vec<u8> },

    /// CRC32 полезной нагрузки не совпадает с записанным.
    #[error("CRC mismatch: computed 0x{computed:08X}, recorded 0x{recorded:08X}{}", fmt_offset(.offset))]
    IntegrityMismatch {
        computed: u32,
        recorded: u32,
        offset: Option<u64>,
    },

    /// Ошибка распаковки фрейма.
    #[error("{codec} decompression failed: {reason}{}", fmt_offset(.offset))]
    Decompression {
        codec: &'static str,
        reason: String,
        offset: Option<u64>,
    },
}

impl DecodeError {
    /// Сдвигает offset ошибки на `base` (относительный offset внутри записи
    /// превращается в абсолютный offset в потоке).
    pub fn rebase(
        mut self,
        base: u64,
    ) -> Self {
        match &mut self {
            Self::TruncatedStream { offset, .. }
            | Self::CorruptLength { offset, .. }
            | Self::SchemaMismatch { offset, .. }
            | Self::IntegrityMismatch { offset, .. }
            | Self::Decompression { offset, .. } => {
                *offset = Some(offset.unwrap_or(0) + base);
            }
            Self::InvalidHeader { .. } | Self::UnsupportedVersion { .. } => {}
        }
        self
    }

    /// Возвращает offset ошибки, если он известен.
    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::TruncatedStream { offset, .. }
            | Self::CorruptLength { offset, .. }
            | Self::SchemaMismatch { offset, .. }
            | Self::IntegrityMismatch { offset, .. }
            | Self::Decompression { offset, .. } => *offset,
            Self::InvalidHeader { .. } | Self::UnsupportedVersion { .. } => None,
        }
    }
}

impl ErrorExt for DecodeError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::TruncatedStream { .. } => StatusCode::TruncatedStream,
            Self::CorruptLength { .. } => StatusCode::CorruptLength,
            Self::SchemaMismatch { .. } => StatusCode::SchemaMismatch,
            Self::InvalidHeader { .. } => StatusCode::InvalidHeader,
            Self::UnsupportedVersion { .. } => StatusCode::UnsupportedVersion,
            Self::IntegrityMismatch { .. } => StatusCode::IntegrityMismatch,
            Self::Decompression { .. } => StatusCode::Decompression,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "decode".to_string()),
            ("status_code", self.status_code().to_string()),
        ];
        if let Some(o) = self.offset() {
            tags.push(("offset", o.to_string()));
        }
        tags
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что rebase прибавляет базу к offset, а для ошибок
    /// заголовка ничего не меняет.
    #[test]
    fn test_rebase() {
        let err = DecodeError::SchemaMismatch {
            reason: "unknown tag".to_string(),
            offset: Some(6),
        }
        .rebase(100);
        assert_eq!(err.offset(), Some(106));

        let err = DecodeError::InvalidHeader {
            reason: "bad magic".to_string(),
        }
        .rebase(100);
        assert_eq!(err.offset(), None);
    }

    /// Тест проверяет отображение ошибки усечения.
    #[test]
    fn test_display_truncated() {
        let err = DecodeError::TruncatedStream {
            context: "frame payload".to_string(),
            offset: Some(0x20),
            expected: 100,
            got: 40,
        };
        let s = err.to_string();
        assert!(s.contains("frame payload"));
        assert!(s.contains("expected 100 bytes, got 40"));
        assert!(s.contains("0x20"));
    }

    /// Тест проверяет маппинг вариантов на коды статуса.
    #[test]
    fn test_status_codes() {
        let err = DecodeError::UnsupportedVersion {
            found: 9,
            supported: vec![1],
        };
        assert_eq!(err.status_code(), StatusCode::UnsupportedVersion);

        let err = DecodeError::IntegrityMismatch {
            computed: 1,
            recorded: 2,
            offset: None,
        };
        assert_eq!(err.status_code(), StatusCode::IntegrityMismatch);
        assert!(err.to_string().contains("0x00000001"));
    }
}
