//! Lease-based project locking on top of [`LockStore`].
//!
//! Locks protect a `{repo}#{project}` namespace within one organization.
//! Every lease is bounded so a crashed worker cannot wedge a project
//! forever; a holder that is still alive extends its lease by
//! re-acquiring. Acquisition is retried once after a short backoff to
//! ride out a release racing with the claim.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tracing::{debug, info, warn};

use burrow_state::{LockRecord, LockStore};

use crate::error::{BurrowError, Result};

/// Leases outlive any reasonable job run but not a stuck one.
const DEFAULT_LEASE_MINUTES: i64 = 30;
const RETRY_BACKOFF: StdDuration = StdDuration::from_millis(250);

/// Acquires and releases project locks for a batch's jobs.
pub struct LockManager {
    store: Arc<dyn LockStore>,
    lease: Duration,
}

impl LockManager {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self {
            store,
            lease: Duration::minutes(DEFAULT_LEASE_MINUTES),
        }
    }

    pub fn with_lease(store: Arc<dyn LockStore>, lease: Duration) -> Self {
        Self { store, lease }
    }

    /// Claim `namespace` for `holder`, retrying once after a short
    /// backoff. Fails with [`BurrowError::LockUnavailable`] when another
    /// live holder keeps the lease through both attempts.
    pub async fn acquire(&self, org_id: &str, namespace: &str, holder: &str) -> Result<()> {
        if self
            .store
            .try_acquire(org_id, namespace, holder, self.lease)
            .await?
        {
            debug!(namespace, holder, "lock acquired");
            return Ok(());
        }

        tokio::time::sleep(RETRY_BACKOFF).await;
        if self
            .store
            .try_acquire(org_id, namespace, holder, self.lease)
            .await?
        {
            debug!(namespace, holder, "lock acquired on retry");
            return Ok(());
        }

        let current = self.store.get(org_id, namespace).await?;
        let current_holder = current
            .map(|l| l.holder)
            .unwrap_or_else(|| "unknown".to_string());
        warn!(namespace, holder = %current_holder, "lock unavailable");
        Err(BurrowError::LockUnavailable {
            namespace: namespace.to_string(),
            holder: current_holder,
        })
    }

    /// Release a claim held by `holder`. Releasing a lock that is absent
    /// or owned by another holder does nothing.
    pub async fn release(&self, org_id: &str, namespace: &str, holder: &str) -> Result<()> {
        self.store.release(org_id, namespace, holder).await?;
        info!(namespace, holder, "lock released");
        Ok(())
    }

    /// Inspect a namespace's current claim.
    pub async fn current(&self, org_id: &str, namespace: &str) -> Result<Option<LockRecord>> {
        Ok(self.store.get(org_id, namespace).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_state::MemoryLockStore;

    fn manager() -> LockManager {
        LockManager::new(Arc::new(MemoryLockStore::new()))
    }

    #[tokio::test]
    async fn test_acquire_then_release() {
        let locks = manager();
        locks.acquire("org-1", "acme-infra#vpc", "job-1").await.unwrap();
        let held = locks.current("org-1", "acme-infra#vpc").await.unwrap().unwrap();
        assert_eq!(held.holder, "job-1");

        locks.release("org-1", "acme-infra#vpc", "job-1").await.unwrap();
        assert!(locks.current("org-1", "acme-infra#vpc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_contended_acquire_names_the_holder() {
        let locks = manager();
        locks.acquire("org-1", "acme-infra#vpc", "job-1").await.unwrap();

        let err = locks
            .acquire("org-1", "acme-infra#vpc", "job-2")
            .await
            .unwrap_err();
        match err {
            BurrowError::LockUnavailable { namespace, holder } => {
                assert_eq!(namespace, "acme-infra#vpc");
                assert_eq!(holder, "job-1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_holder_reacquire_extends_lease() {
        let locks = manager();
        locks.acquire("org-1", "acme-infra#vpc", "job-1").await.unwrap();
        let first = locks.current("org-1", "acme-infra#vpc").await.unwrap().unwrap();

        locks.acquire("org-1", "acme-infra#vpc", "job-1").await.unwrap();
        let second = locks.current("org-1", "acme-infra#vpc").await.unwrap().unwrap();
        assert!(second.lease_until >= first.lease_until);
    }

    #[tokio::test]
    async fn test_expired_lease_is_stolen() {
        let store = Arc::new(MemoryLockStore::new());
        let short = LockManager::with_lease(store.clone(), Duration::milliseconds(-1));
        short.acquire("org-1", "acme-infra#vpc", "job-1").await.unwrap();

        let locks = LockManager::new(store);
        locks.acquire("org-1", "acme-infra#vpc", "job-2").await.unwrap();
        let held = locks.current("org-1", "acme-infra#vpc").await.unwrap().unwrap();
        assert_eq!(held.holder, "job-2");
    }

    #[tokio::test]
    async fn test_foreign_release_is_a_noop() {
        let locks = manager();
        locks.acquire("org-1", "acme-infra#vpc", "job-1").await.unwrap();
        locks.release("org-1", "acme-infra#vpc", "job-2").await.unwrap();
        let held = locks.current("org-1", "acme-infra#vpc").await.unwrap().unwrap();
        assert_eq!(held.holder, "job-1");
    }
}
