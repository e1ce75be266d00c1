use std::{any::Any, error::Error};

use crate::StatusCode;

/// Расширение для ошибок библиотеки (object-safe).
///
/// Кроме статус-кода даёт теги для полей `tracing`, с которыми поток
/// логирует свои ошибки.
pub trait ErrorExt: Error + Send + Sync + 'static {
    /// Код статуса ошибки.
    ///
    /// По умолчанию возвращает [`StatusCode::Internal`].
    fn status_code(&self) -> StatusCode {
        StatusCode::Internal
    }

    /// Возвращает ошибку как [`Any`](std::any::Any),
    /// чтобы можно было выполнить downcast к конкретному типу.
    fn as_any(&self) -> &dyn Any;

    /// Набор пар ключ–значение для структурированного логирования.
    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("error_type", self.type_name()),
            ("status_code", self.status_code().to_string()),
        ]
    }

    /// Имя типа ошибки (для логирования).
    fn type_name(&self) -> String {
        std::any::type_name::<Self>()
            .split("::")
            .last()
            .unwrap_or("Unknown")
            .to_string()
    }
}
