/// Немедленно возвращает ошибку из текущей функции.
///
/// Формы:
/// - `bail!(err)` — принимает готовый тип ошибки (`ErrorExt`) или
///   `StackError`;
/// - `bail!(code, "msg")` — создаёт `GenericError` с кодом и сообщением;
/// - `bail!(code, "fmt {}", arg)` — форматирует сообщение.
///
/// ```ignore
/// use hddm_error::{bail, StatusCode};
///
/// fn check_block_size(size: usize) -> hddm_error::HddmResult<()> {
///     if size == 0 {
///         bail!(StatusCode::InvalidConfig, "block size must be positive");
///     }
///     Ok(())
/// }
/// ```
#[macro_export]
macro_rules! bail {
    ($err:expr) => {
        return Err($crate::StackError::from($err))
    };
    ($code:expr, $msg:expr) => {
        return Err($crate::StackError::new(
            $crate::types::GenericError::new($code, $msg)
        ))
    };
    ($code:expr, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::StackError::new(
            $crate::types::GenericError::new($code, format!($fmt, $($arg)*))
        ))
    };
}

/// Проверяет условие и вызывает `bail!`, если условие ложно.
///
/// ```ignore
/// use hddm_error::{ensure, DecodeError};
///
/// ensure!(
///     len <= max,
///     DecodeError::CorruptLength { what: "frame".into(), declared: len as u64, available: max as u64, offset: None }
/// );
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            $crate::bail!($err);
        }
    };
    ($cond:expr, $code:expr, $msg:expr) => {
        if !($cond) {
            $crate::bail!($code, $msg);
        }
    };
    ($cond:expr, $code:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::bail!($code, $fmt, $($arg)*);
        }
    };
}

/// Трейт-расширение для `Result`, добавляющее методы контекстирования.
///
/// Превращает ошибку в [`StackError`](crate::StackError) и приклеивает к ней
/// контекст.
pub trait ResultExt<T> {
    /// Добавляет контекст к ошибке.
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>;

    /// Добавляет ленивый контекст (вызывается только в случае ошибки).
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<crate::StackError>,
{
    #[track_caller]
    fn context<C>(
        self,
        ctx: C,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
    {
        self.map_err(|e| e.into().context(ctx))
    }

    #[track_caller]
    fn with_context<C, F>(
        self,
        f: F,
    ) -> Result<T, crate::StackError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
