//! Fault-injecting store wrapper for crash, partial-failure and race tests.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{EdgeStore, Relation, SharedStore, UserDirectory};
use crate::error::{Error, Result};
use crate::identity::UserId;

/// Delegates to an inner store until its write budget runs out
pub(crate) struct FlakyStore {
    inner: SharedStore,
    /// Writes still allowed before failing; `usize::MAX` means unlimited
    budget: AtomicUsize,
    /// Writes that reached the inner store
    applied: AtomicUsize,
    fail_reads: AtomicBool,
    /// Hand control back to the scheduler before every call
    yield_steps: AtomicBool,
}

impl FlakyStore {
    pub(crate) fn new(inner: SharedStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            budget: AtomicUsize::new(usize::MAX),
            applied: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            yield_steps: AtomicBool::new(false),
        })
    }

    /// Allow `n` more writes, then fail every write
    pub(crate) fn fail_after(&self, n: usize) {
        self.budget.store(n, Ordering::SeqCst);
    }

    pub(crate) fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Yield before each read and write so concurrent operations interleave
    pub(crate) fn yield_between_steps(&self, on: bool) {
        self.yield_steps.store(on, Ordering::SeqCst);
    }

    async fn pace(&self) {
        if self.yield_steps.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    }

    /// Stop injecting failures
    pub(crate) fn heal(&self) {
        self.budget.store(usize::MAX, Ordering::SeqCst);
        self.fail_reads.store(false, Ordering::SeqCst);
    }

    pub(crate) fn writes_applied(&self) -> usize {
        self.applied.load(Ordering::SeqCst)
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("injected read failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl EdgeStore for FlakyStore {
    async fn read(&self, user: &UserId, relation: Relation, other: &UserId) -> Result<bool> {
        self.pace().await;
        self.check_reads()?;
        self.inner.read(user, relation, other).await
    }

    async fn read_all(&self, user: &UserId, relation: Relation) -> Result<BTreeSet<UserId>> {
        self.pace().await;
        self.check_reads()?;
        self.inner.read_all(user, relation).await
    }

    async fn write(
        &self,
        user: &UserId,
        relation: Relation,
        other: &UserId,
        present: bool,
    ) -> Result<()> {
        self.pace().await;
        let allowed = self
            .budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if !allowed {
            return Err(Error::StoreUnavailable("injected write failure".into()));
        }

        self.inner.write(user, relation, other, present).await?;
        self.applied.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for FlakyStore {
    async fn contains(&self, user: &UserId) -> Result<bool> {
        self.pace().await;
        self.check_reads()?;
        self.inner.contains(user).await
    }

    async fn register(&self, user: &UserId) -> Result<()> {
        self.inner.register(user).await
    }

    async fn users(&self) -> Result<Vec<UserId>> {
        self.check_reads()?;
        self.inner.users().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryEdgeStore;

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let store = FlakyStore::new(Arc::new(MemoryEdgeStore::new()));
        let (a, b) = (UserId::new("a").unwrap(), UserId::new("b").unwrap());

        store.fail_after(1);
        store.write(&a, Relation::Friends, &b, true).await.unwrap();
        let err = store.write(&b, Relation::Friends, &a, true).await.unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(store.writes_applied(), 1);

        store.heal();
        store.write(&b, Relation::Friends, &a, true).await.unwrap();
        assert_eq!(store.writes_applied(), 2);
    }
}
