//! Blocking: the block record, its cascade, and the guard other operations
//! consult before writing.

use std::sync::Arc;

use super::plan;
use super::reconcile::Reconciler;
use super::state::PairState;
use super::validate_pair;
use crate::error::{Error, Result};
use crate::identity::UserId;
use crate::storage::{apply_all, EdgeWrite, Relation, SharedStore};

/// Block and unblock, plus the block guard
pub struct BlockPolicy {
    store: SharedStore,
    reconciler: Arc<Reconciler>,
}

impl BlockPolicy {
    /// Create a policy over a store
    pub fn new(store: SharedStore, reconciler: Arc<Reconciler>) -> Self {
        Self { store, reconciler }
    }

    /// Has either user blocked the other? Always a fresh read.
    pub async fn is_blocked_either_way(&self, a: &UserId, b: &UserId) -> Result<bool> {
        let (a_blocks, b_blocks) = futures::try_join!(
            self.store.read(a, Relation::Blocked, b),
            self.store.read(b, Relation::Blocked, a),
        )?;
        Ok(a_blocks || b_blocks)
    }

    /// Fail with `Blocked` if either user has blocked the other
    ///
    /// Operations call this immediately before their first additive write,
    /// after any snapshot they took earlier.
    pub async fn ensure_not_blocked(&self, a: &UserId, b: &UserId) -> Result<()> {
        if self.is_blocked_either_way(a, b).await? {
            tracing::debug!(a = %a, b = %b, "Write refused, pair is blocked");
            return Err(Error::Blocked);
        }
        Ok(())
    }

    /// `actor` blocks `target`
    ///
    /// Writes the block record first, then removes every friends and request
    /// record between the pair. Re-blocking an already-blocked pair finishes
    /// any cascade an earlier attempt left behind before reporting
    /// `AlreadyBlocked`.
    pub async fn block(&self, actor: &UserId, target: &UserId) -> Result<PairState> {
        validate_pair(&*self.store, actor, target).await?;

        let snapshot = self.reconciler.snapshot(actor, target).await?;
        let cascade = plan::block_cascade(actor, target);

        if snapshot.a_side.blocked {
            if snapshot.friends_any() || snapshot.pending_any() {
                apply_all(&*self.store, &cascade).await?;
                tracing::info!(blocker = %actor, target = %target, "Completed interrupted block cascade");
            }
            return Err(Error::AlreadyBlocked);
        }

        EdgeWrite::set(actor, Relation::Blocked, target)
            .apply(&*self.store)
            .await?;
        apply_all(&*self.store, &cascade).await?;

        tracing::info!(blocker = %actor, target = %target, "User blocked");
        Ok(self.reconciler.observe(actor, target).await?.state())
    }

    /// `actor` removes their block on `target`
    ///
    /// Only the actor's own record is touched; a block held by `target`
    /// stays in force.
    pub async fn unblock(&self, actor: &UserId, target: &UserId) -> Result<PairState> {
        validate_pair(&*self.store, actor, target).await?;

        if !self.store.read(actor, Relation::Blocked, target).await? {
            return Err(Error::NotBlocked);
        }

        EdgeWrite::clear(actor, Relation::Blocked, target)
            .apply(&*self.store)
            .await?;

        tracing::info!(user = %actor, target = %target, "User unblocked");
        Ok(self.reconciler.observe(actor, target).await?.state())
    }
}
