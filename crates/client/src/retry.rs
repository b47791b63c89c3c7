//! # 指数バックオフ付きリトライ
//!
//! 試行 `k+1` の前に `base_delay * 2^(k-1)` 待機する（1s, 2s, 4s, ...）。ジッターなし。
//! 再試行するかどうかはエラー側の [`Retryable::is_retryable`] で判定する。

use std::future::Future;
use std::time::Duration;

use crate::config::{DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES};

/// 再試行可否を判定できるエラー。
pub trait Retryable {
    /// 一時的な失敗であれば `true`
    fn is_retryable(&self) -> bool;
}

/// リトライ結果のエラー。
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// 再試行対象外のエラー（試行を打ち切った）
    #[error("{0}")]
    Terminal(E),
    /// 最大試行回数に到達
    #[error("{attempts}回試行後も失敗: {last}")]
    Exhausted { attempts: u32, last: E },
}

/// リトライ方針。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大試行回数（0は1として扱う）
    pub max_attempts: u32,
    /// 初回再試行前の待機時間
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// `failed_attempt` 回目（1始まり）の失敗後に待機する時間。
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// `op` を最大 `policy.max_attempts` 回実行する。
///
/// `op` には1始まりの試行番号が渡される。呼び出し中のタスクは待機時間の合計だけブロックされる。
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: Retryable + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        tracing::debug!(attempt, max_attempts, "リクエストを試行します");
        match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "再試行で成功しました");
                }
                return Ok(value);
            }
            Err(e) if !e.is_retryable() => {
                tracing::warn!(attempt, error = %e, "再試行対象外のエラーのため中断します");
                return Err(RetryError::Terminal(e));
            }
            Err(e) if attempt >= max_attempts => {
                tracing::error!(attempts = attempt, error = %e, "最大試行回数に到達しました");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: e,
                });
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "リクエスト失敗、待機後に再試行します"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
