//! Unlocked lock for single-instance deployments.
//!
//! spec's documented trade-off: running unlocked is only safe when
//! exactly one instance of a service is running. `NullLock` makes that
//! deployment decision explicit in code rather than leaving it implicit
//! in "nobody configured `REDIS_URL`".

use crate::{DistributedLock, FenceToken, LockHandle, LockResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Always succeeds, immediately. Hands out monotonically increasing
/// fence tokens from an in-process counter purely so callers that log
/// `LockHandle`s see a plausible value; nothing ever checks them.
pub struct NullLock {
    counter: AtomicU64,
}

impl NullLock {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(1),
        }
    }
}

impl Default for NullLock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DistributedLock for NullLock {
    async fn acquire(
        &self,
        resource_type: &str,
        resource_id: &str,
        _ttl: Duration,
    ) -> LockResult<LockHandle> {
        let fence_token: FenceToken = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(LockHandle {
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            fence_token,
        })
    }

    async fn release(&self, _handle: &LockHandle) -> LockResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_always_succeeds_with_increasing_tokens() {
        let lock = NullLock::new();
        let a = lock.acquire("product", "sku-1", Duration::from_secs(1)).await.unwrap();
        let b = lock.acquire("product", "sku-1", Duration::from_secs(1)).await.unwrap();
        assert!(b.fence_token > a.fence_token);
    }

    #[tokio::test]
    async fn release_is_always_ok() {
        let lock = NullLock::new();
        let handle = LockHandle {
            resource_type: "product".into(),
            resource_id: "sku-1".into(),
            fence_token: 999,
        };
        assert!(matches!(lock.release(&handle).await, Ok(())));
    }
}
