//! Повторное открытие потока с экспоненциальной задержкой.
//!
//! Ядро (транспорт, декодер, итератор) само ничего не повторяет; эта
//! обёртка повторяет только `IStream::open` и только для сбоев подключения.

use std::{thread, time::Duration};

use hddm_error::HddmResult;
use tracing::{debug, warn};

use super::IStream;
use crate::config::StreamConfig;

/// Параметры повторов.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Всего попыток, включая первую
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Политика без повторов.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Задержка перед попыткой `attempt` (вторая попытка — `attempt = 1`).
    pub fn delay_for(
        &self,
        attempt: u32,
    ) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.max(1.0).powi(attempt as i32 - 1);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        if !millis.is_finite() || millis >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }
        Duration::from_millis(millis as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

/// Открывает поток, повторяя попытки при `ConnectFailed` и `Timeout`.
///
/// Остальные ошибки (схема, адрес, заголовок) возвращаются сразу.
pub fn open_with_retry(
    locator: &str,
    config: &StreamConfig,
    policy: &RetryPolicy,
) -> HddmResult<IStream> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match IStream::open(locator, config.clone()) {
            Ok(stream) => {
                if attempt > 0 {
                    debug!(locator, attempt, "Opened after retry");
                }
                return Ok(stream);
            }
            Err(e) if e.status_code().is_retryable() && attempt + 1 < attempts => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                warn!(
                    locator,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Open failed, retrying"
                );
                thread::sleep(delay);
            }
            Err(e) => return Err(e),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////
