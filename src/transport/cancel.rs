//! Сигнал отмены, разделяемый между потоком чтения и внешним кодом.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use hddm_error::{HddmResult, TransportError};
use parking_lot::Mutex;

type CloseHook = Box<dyn FnOnce() + Send>;

/// Токен отмены.
///
/// Первый вызов [`cancel`](CancelToken::cancel) выставляет флаг и запускает
/// зарегистрированные хуки (например, `shutdown` сокета), чтобы прервать
/// блокирующее чтение. Повторные вызовы ничего не делают.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    hooks: Mutex<Vec<CloseHook>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Запрашивает отмену. Возвращает `true` только для первого вызова.
    pub fn cancel(&self) -> bool {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        let hooks = std::mem::take(&mut *self.inner.hooks.lock());
        for hook in hooks {
            hook();
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Регистрирует хук закрытия. Если отмена уже запрошена, хук
    /// выполняется сразу.
    pub fn on_cancel<F>(
        &self,
        hook: F,
    ) where
        F: FnOnce() + Send + 'static,
    {
        let mut hooks = self.inner.hooks.lock();
        if self.is_cancelled() {
            drop(hooks);
            hook();
        } else {
            hooks.push(Box::new(hook));
        }
    }

    /// Возвращает `Cancelled`, если отмена запрошена.
    pub fn check(
        &self,
        operation: &str,
    ) -> HddmResult<()> {
        if self.is_cancelled() {
            return Err(TransportError::cancelled(operation).into());
        }
        Ok(())
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
