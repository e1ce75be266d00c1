use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки доступа к полям события.
///
/// Это обычный исход, а не сбой потока: вызывающий код обязан их
/// обрабатывать.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// Поле отсутствует в дереве события.
    #[error("Field not present: {path}")]
    FieldNotPresent { path: String },

    /// Поле найдено, но его тип не подходит для аксессора.
    #[error("Field '{path}' is {found}, expected {expected}")]
    FieldKindMismatch {
        path: String,
        expected: &'static str,
        found: String,
    },
}

impl FieldError {
    pub fn not_present(path: impl Into<String>) -> Self {
        Self::FieldNotPresent { path: path.into() }
    }

    /// Путь поля, к которому относится ошибка.
    pub fn path(&self) -> &str {
        match self {
            Self::FieldNotPresent { path } | Self::FieldKindMismatch { path, .. } => path,
        }
    }
}

impl ErrorExt for FieldError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::FieldNotPresent { .. } => StatusCode::FieldNotPresent,
            Self::FieldKindMismatch { .. } => StatusCode::FieldKindMismatch,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
