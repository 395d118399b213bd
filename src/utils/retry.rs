//! 瞬时错误重试

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::AppResult;

/// 带指数退避的重试
///
/// 只重试 `is_transient()` 的错误，其余错误（包括配额耗尽）立即返回。
///
/// # 参数
/// - `label`: 日志中的操作名
/// - `attempts`: 最多调用次数（至少 1 次）
/// - `backoff`: 第 n 次失败后等待 `backoff * 2^(n-1)`
pub async fn retry_with_backoff<T, F, Fut>(
    label: &str,
    attempts: u32,
    backoff: Duration,
    mut op: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                warn!("⚠️ {} 失败（第 {}/{} 次）: {}", label, attempt, attempts, e);
                tokio::time::sleep(backoff * 2u32.pow(attempt - 1)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, BackendError};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> AppError {
        BackendError::ServerError {
            endpoint: "/api/search".into(),
            status: 502,
        }
        .into()
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_with_backoff("搜索", 3, Duration::ZERO, move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok(7)
            }
        })
        .await;
        tokio_test::assert_ok!(&result);
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: AppResult<()> = retry_with_backoff("搜索", 2, Duration::ZERO, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;
        tokio_test::assert_err!(&result);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_quota_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: AppResult<()> = retry_with_backoff("生成", 5, Duration::ZERO, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::QuotaExceeded {
                endpoint: "/api/ai/answer".into(),
                message: "quota".into(),
            }
            .into())
        })
        .await;
        assert!(result.unwrap_err().is_quota_exceeded());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
