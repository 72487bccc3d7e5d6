//! # Relationship Module
//!
//! Friend requests, friendships and blocks between pairs of users, kept
//! consistent over a store that only offers single-key writes.
//!
//! ## Pair State Machine
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PAIR STATE MACHINE                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │                 send(A→B)                  accept(B)                    │
//! │   ┌────────┐ ──────────────► ┌──────────┐ ─────────────► ┌─────────┐   │
//! │   │  NONE  │                 │ PENDING  │                │ FRIENDS │   │
//! │   └────────┘ ◄────────────── └──────────┘                └─────────┘   │
//! │     ▲   ▲     decline/cancel      │                            │        │
//! │     │   └─────────────────────────┼──── remove_friend ─────────┘        │
//! │     │                             │                                     │
//! │     │ unblock         block (from any state, cascades)                  │
//! │     │                             ▼                                     │
//! │     │                      ┌──────────┐                                 │
//! │     └───────────────────── │ BLOCKED  │                                 │
//! │                            └──────────┘                                 │
//! │                                                                         │
//! │   send(B→A) while PENDING(from A) is an implicit accept                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Components
//!
//! | Component | Role |
//! |-----------|------|
//! | [`state`] | Snapshots, derived pair-state, divergence detection |
//! | [`plan`] | Ordered write sequences shared by operations and repair |
//! | [`RequestLifecycle`] | Send, accept, decline, cancel, remove |
//! | [`BlockPolicy`] | Block, unblock, the block guard |
//! | [`Reconciler`] | Read-repair and background sweeps |

pub mod plan;
pub mod state;

mod block;
mod lifecycle;
mod reconcile;

pub use block::BlockPolicy;
pub use lifecycle::RequestLifecycle;
pub use reconcile::{
    repair_plan, ReconcileReport, Reconciler, SweepReport, DEFAULT_SWEEP_CONCURRENCY,
};
pub use state::{BlockedBy, Divergence, HalfRecord, PairSnapshot, PairState};

use crate::error::{Error, Result};
use crate::identity::UserId;
use crate::storage::UserDirectory;

/// Fail with `NotFound` unless the directory knows `user`
pub(crate) async fn ensure_known<S: UserDirectory + ?Sized>(
    directory: &S,
    user: &UserId,
) -> Result<()> {
    if directory.contains(user).await? {
        Ok(())
    } else {
        Err(Error::NotFound(user.to_string()))
    }
}

/// Validation shared by every pair operation; runs before any write
pub(crate) async fn validate_pair<S: UserDirectory + ?Sized>(
    directory: &S,
    actor: &UserId,
    target: &UserId,
) -> Result<()> {
    if actor == target {
        return Err(Error::SelfReference);
    }
    ensure_known(directory, actor).await?;
    ensure_known(directory, target).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryEdgeStore;

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_validate_pair() {
        let store = MemoryEdgeStore::with_users(&[uid("alice"), uid("bob")]);

        assert!(validate_pair(&store, &uid("alice"), &uid("bob")).await.is_ok());
        assert_eq!(
            validate_pair(&store, &uid("alice"), &uid("alice")).await,
            Err(Error::SelfReference)
        );
        assert_eq!(
            validate_pair(&store, &uid("alice"), &uid("zoe")).await,
            Err(Error::NotFound("zoe".into()))
        );
        assert_eq!(
            validate_pair(&store, &uid("zoe"), &uid("bob")).await,
            Err(Error::NotFound("zoe".into()))
        );
    }
}
