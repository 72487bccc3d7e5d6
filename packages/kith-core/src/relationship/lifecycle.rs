//! Friend request lifecycle: send, accept, decline, cancel and removal of an
//! established friendship.
//!
//! Every operation follows the same shape:
//!
//! 1. validate the pair (before any write)
//! 2. observe the pair, repairing it first when read-repair is on
//! 3. decide from the snapshot, failing with a precise error
//! 4. consult the block guard right before the first additive write
//! 5. apply the planned writes in order
//! 6. observe again and return the resulting state
//!
//! Retrying an operation after a failure in step 5 finishes the remaining
//! writes or, if a repair already did, fails with the error matching the
//! converged state.

use std::sync::Arc;

use super::block::BlockPolicy;
use super::plan;
use super::reconcile::Reconciler;
use super::state::{PairSnapshot, PairState};
use super::validate_pair;
use crate::error::{Error, Result};
use crate::identity::UserId;
use crate::storage::{apply_all, EdgeWrite, Relation, SharedStore};

/// Request and friendship transitions
pub struct RequestLifecycle {
    store: SharedStore,
    reconciler: Arc<Reconciler>,
    blocks: Arc<BlockPolicy>,
}

impl RequestLifecycle {
    /// Create the lifecycle over a store
    pub fn new(store: SharedStore, reconciler: Arc<Reconciler>, blocks: Arc<BlockPolicy>) -> Self {
        Self {
            store,
            reconciler,
            blocks,
        }
    }

    async fn settle(&self, a: &UserId, b: &UserId) -> Result<PairState> {
        Ok(self.reconciler.observe(a, b).await?.state())
    }

    /// Turn the request from `sender` into a friendship, `actor` accepting
    ///
    /// Request records go before the friendship is written; the block guard
    /// runs between the two.
    async fn establish(
        &self,
        actor: &UserId,
        sender: &UserId,
        snapshot: &PairSnapshot,
    ) -> Result<PairState> {
        let mut teardown = plan::withdraw_request(sender, actor);
        if snapshot.pending_from_a() {
            teardown.extend(plan::withdraw_request(actor, sender));
        }
        apply_all(&*self.store, &teardown).await?;

        self.blocks.ensure_not_blocked(actor, sender).await?;
        apply_all(&*self.store, &plan::befriend(actor, sender)).await?;

        tracing::info!(user = %actor, friend = %sender, "Friendship established");
        self.settle(actor, sender).await
    }

    /// `actor` asks `target` to be friends
    ///
    /// If `target` already asked `actor`, this accepts that request instead.
    pub async fn send(&self, actor: &UserId, target: &UserId) -> Result<PairState> {
        validate_pair(&*self.store, actor, target).await?;
        let snapshot = self.reconciler.observe(actor, target).await?;

        if snapshot.is_blocked_either_way() {
            return Err(Error::Blocked);
        }
        if snapshot.friends_any() {
            return Err(Error::AlreadyFriends);
        }

        if snapshot.a_side.sent {
            if snapshot.b_side.received {
                return Err(Error::AlreadyPending);
            }
            // An earlier send stopped after the sender record
            self.blocks.ensure_not_blocked(actor, target).await?;
            EdgeWrite::set(target, Relation::RequestsReceived, actor)
                .apply(&*self.store)
                .await?;
            tracing::info!(from = %actor, to = %target, "Resumed interrupted friend request");
            return self.settle(actor, target).await;
        }

        if snapshot.pending_from_b() {
            tracing::info!(from = %actor, to = %target, "Reciprocal request, accepting instead");
            return self.establish(actor, target, &snapshot).await;
        }

        self.blocks.ensure_not_blocked(actor, target).await?;
        apply_all(&*self.store, &plan::open_request(actor, target)).await?;

        tracing::info!(from = %actor, to = %target, "Friend request sent");
        self.settle(actor, target).await
    }

    /// `actor` accepts the request `sender` made
    pub async fn accept(&self, actor: &UserId, sender: &UserId) -> Result<PairState> {
        validate_pair(&*self.store, actor, sender).await?;
        let snapshot = self.reconciler.observe(actor, sender).await?;

        if snapshot.is_blocked_either_way() {
            return Err(Error::Blocked);
        }
        if snapshot.friends_both() {
            return Err(Error::NoSuchRequest);
        }
        if snapshot.friends_any() {
            // An earlier accept stopped between the two friends records
            tracing::info!(user = %actor, friend = %sender, "Completing interrupted accept");
            return self.establish(actor, sender, &snapshot).await;
        }
        if !snapshot.pending_from_b() {
            return Err(Error::NoSuchRequest);
        }

        self.establish(actor, sender, &snapshot).await
    }

    /// `actor` declines the request `sender` made
    pub async fn decline(&self, actor: &UserId, sender: &UserId) -> Result<PairState> {
        validate_pair(&*self.store, actor, sender).await?;
        let snapshot = self.reconciler.observe(actor, sender).await?;

        if !snapshot.pending_from_b() {
            return Err(Error::NoSuchRequest);
        }

        apply_all(&*self.store, &plan::withdraw_request(sender, actor)).await?;

        tracing::info!(user = %actor, from = %sender, "Friend request declined");
        self.settle(actor, sender).await
    }

    /// `actor` withdraws their request to `target`
    pub async fn cancel(&self, actor: &UserId, target: &UserId) -> Result<PairState> {
        validate_pair(&*self.store, actor, target).await?;
        let snapshot = self.reconciler.observe(actor, target).await?;

        if !snapshot.pending_from_a() {
            return Err(Error::NoSuchRequest);
        }

        apply_all(&*self.store, &plan::withdraw_request(actor, target)).await?;

        tracing::info!(from = %actor, to = %target, "Friend request cancelled");
        self.settle(actor, target).await
    }

    /// `actor` ends the friendship with `friend`
    pub async fn remove_friend(&self, actor: &UserId, friend: &UserId) -> Result<PairState> {
        validate_pair(&*self.store, actor, friend).await?;
        let snapshot = self.reconciler.observe(actor, friend).await?;

        if !snapshot.friends_any() {
            return Err(Error::NotFriends);
        }

        apply_all(&*self.store, &plan::unfriend(actor, friend)).await?;

        tracing::info!(user = %actor, friend = %friend, "Friendship removed");
        self.settle(actor, friend).await
    }
}
