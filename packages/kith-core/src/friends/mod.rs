//! # Friends Module
//!
//! The operation surface collaborators call: friend requests, friendships,
//! blocks and the read-only projections over them.
//!
//! ## Operation Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         OPERATION FLOW                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Caller                                                                │
//! │    │  send_request(alice, bob)                                         │
//! │    ▼                                                                    │
//! │  ┌─────────────────┐                                                   │
//! │  │ FriendsService  │  validates, dispatches, wraps the result          │
//! │  └────────┬────────┘                                                   │
//! │           │                                                             │
//! │     ┌─────┴──────────────┬──────────────────────┐                      │
//! │     ▼                    ▼                      ▼                      │
//! │  ┌──────────────┐  ┌─────────────┐  ┌──────────────────┐               │
//! │  │ Request      │  │ Block       │  │ Reconciler       │               │
//! │  │ Lifecycle    │─►│ Policy      │  │ (read-repair)    │               │
//! │  └──────┬───────┘  └──────┬──────┘  └────────┬─────────┘               │
//! │         └─────────────────┴──────────────────┘                         │
//! │                           │  single-key reads and writes                │
//! │                           ▼                                             │
//! │                    ┌─────────────┐                                      │
//! │                    │  EdgeStore  │                                      │
//! │                    └─────────────┘                                      │
//! │                                                                         │
//! │  Result: Outcome { action, actor, target, state }                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::identity::UserId;
use crate::relationship::{
    ensure_known, validate_pair, BlockPolicy, PairState, Reconciler, RequestLifecycle,
};
use crate::storage::{Relation, SharedStore};

/// Which operation produced an [`Outcome`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// A friend request was sent (or turned into an accept)
    SendRequest,
    /// A pending request was accepted
    AcceptRequest,
    /// A pending request was declined by its recipient
    DeclineRequest,
    /// A pending request was withdrawn by its sender
    CancelRequest,
    /// A friendship was ended
    RemoveFriend,
    /// A block was placed
    Block,
    /// A block was lifted
    Unblock,
}

impl Action {
    /// Stable name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::SendRequest => "send_request",
            Action::AcceptRequest => "accept_request",
            Action::DeclineRequest => "decline_request",
            Action::CancelRequest => "cancel_request",
            Action::RemoveFriend => "remove_friend",
            Action::Block => "block",
            Action::Unblock => "unblock",
        }
    }
}

/// Result of a successful operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// The operation performed
    pub action: Action,
    /// User on whose behalf it ran
    pub actor: UserId,
    /// The counterpart
    pub target: UserId,
    /// Pair state observed after the operation
    pub state: PairState,
}

impl Outcome {
    fn new(action: Action, actor: &UserId, target: &UserId, state: PairState) -> Self {
        Self {
            action,
            actor: actor.clone(),
            target: target.clone(),
            state,
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Service for managing friend relationships
pub struct FriendsService {
    /// Backing store
    store: SharedStore,
    /// Read-repair and sweeps
    reconciler: Arc<Reconciler>,
    /// Send, accept, decline, cancel, remove
    lifecycle: RequestLifecycle,
    /// Block, unblock, block guard
    blocks: Arc<BlockPolicy>,
}

impl FriendsService {
    /// Create a new friends service
    pub fn new(store: SharedStore, reconciler: Arc<Reconciler>) -> Self {
        let blocks = Arc::new(BlockPolicy::new(store.clone(), reconciler.clone()));
        let lifecycle = RequestLifecycle::new(store.clone(), reconciler.clone(), blocks.clone());
        Self {
            store,
            reconciler,
            lifecycle,
            blocks,
        }
    }

    /// The reconciler this service repairs through
    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// `actor` sends a friend request to `target`
    pub async fn send_request(&self, actor: &UserId, target: &UserId) -> Result<Outcome> {
        let state = self.lifecycle.send(actor, target).await?;
        Ok(Outcome::new(Action::SendRequest, actor, target, state))
    }

    /// `actor` accepts the request from `sender`
    pub async fn accept_request(&self, actor: &UserId, sender: &UserId) -> Result<Outcome> {
        let state = self.lifecycle.accept(actor, sender).await?;
        Ok(Outcome::new(Action::AcceptRequest, actor, sender, state))
    }

    /// `actor` declines the request from `sender`
    pub async fn decline_request(&self, actor: &UserId, sender: &UserId) -> Result<Outcome> {
        let state = self.lifecycle.decline(actor, sender).await?;
        Ok(Outcome::new(Action::DeclineRequest, actor, sender, state))
    }

    /// `actor` cancels their request to `target`
    pub async fn cancel_request(&self, actor: &UserId, target: &UserId) -> Result<Outcome> {
        let state = self.lifecycle.cancel(actor, target).await?;
        Ok(Outcome::new(Action::CancelRequest, actor, target, state))
    }

    /// `actor` removes `friend`
    pub async fn remove_friend(&self, actor: &UserId, friend: &UserId) -> Result<Outcome> {
        let state = self.lifecycle.remove_friend(actor, friend).await?;
        Ok(Outcome::new(Action::RemoveFriend, actor, friend, state))
    }

    /// `actor` blocks `target`, dropping any friendship or request between them
    pub async fn block_user(&self, actor: &UserId, target: &UserId) -> Result<Outcome> {
        let state = self.blocks.block(actor, target).await?;
        Ok(Outcome::new(Action::Block, actor, target, state))
    }

    /// `actor` lifts their block on `target`
    pub async fn unblock_user(&self, actor: &UserId, target: &UserId) -> Result<Outcome> {
        let state = self.blocks.unblock(actor, target).await?;
        Ok(Outcome::new(Action::Unblock, actor, target, state))
    }

    /// Has either user blocked the other?
    pub async fn is_blocked_either_way(&self, a: &UserId, b: &UserId) -> Result<bool> {
        validate_pair(&*self.store, a, b).await?;
        self.blocks.is_blocked_either_way(a, b).await
    }

    /// Current state of the pair
    pub async fn get_pair_state(&self, a: &UserId, b: &UserId) -> Result<PairState> {
        validate_pair(&*self.store, a, b).await?;
        Ok(self.reconciler.observe(a, b).await?.state())
    }

    /// Users holding a friendship with `user`
    pub async fn list_friends(&self, user: &UserId) -> Result<Vec<UserId>> {
        self.project(user, Relation::Friends).await
    }

    /// Users with a pending request to `user`
    pub async fn list_incoming_requests(&self, user: &UserId) -> Result<Vec<UserId>> {
        self.project(user, Relation::RequestsReceived).await
    }

    /// Users `user` has a pending request to
    pub async fn list_outgoing_requests(&self, user: &UserId) -> Result<Vec<UserId>> {
        self.project(user, Relation::RequestsSent).await
    }

    /// Users `user` has blocked
    pub async fn list_blocked(&self, user: &UserId) -> Result<Vec<UserId>> {
        self.project(user, Relation::Blocked).await
    }

    /// Read one of `user`'s relations, repairing each listed pair first
    /// when read-repair is on
    async fn project(&self, user: &UserId, relation: Relation) -> Result<Vec<UserId>> {
        ensure_known(&*self.store, user).await?;
        let others = self.store.read_all(user, relation).await?;

        if !self.reconciler.repairs_on_read() {
            return Ok(others.into_iter().collect());
        }

        let mut repaired = false;
        for other in &others {
            repaired |= self.reconciler.reconcile_pair(user, other).await?.repaired();
        }

        if !repaired {
            return Ok(others.into_iter().collect());
        }

        tracing::debug!(user = %user, relation = %relation, "Projection repaired pairs, re-reading");
        Ok(self.store.read_all(user, relation).await?.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::relationship::{BlockedBy, PairSnapshot};
    use crate::storage::flaky::FlakyStore;
    use crate::storage::{EdgeStore, MemoryEdgeStore, UserDirectory};
    use proptest::prelude::*;

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn service_with(store: SharedStore, repair_on_read: bool) -> FriendsService {
        let reconciler = Arc::new(Reconciler::new(store.clone()).with_repair_on_read(repair_on_read));
        FriendsService::new(store, reconciler)
    }

    fn setup() -> (Arc<MemoryEdgeStore>, FriendsService) {
        let store = Arc::new(MemoryEdgeStore::with_users(&[
            uid("alice"),
            uid("bob"),
            uid("carol"),
        ]));
        (store.clone(), service_with(store, true))
    }

    #[tokio::test]
    async fn test_request_accept_block_scenario() {
        let (_store, service) = setup();
        let (a, b) = (uid("alice"), uid("bob"));

        let outcome = service.send_request(&a, &b).await.unwrap();
        assert_eq!(outcome.action, Action::SendRequest);
        assert_eq!(outcome.state, PairState::Pending { from: a.clone() });

        let outcome = service.accept_request(&b, &a).await.unwrap();
        assert_eq!(outcome.state, PairState::Friends);

        let outcome = service.block_user(&a, &b).await.unwrap();
        assert_eq!(
            outcome.state,
            PairState::Blocked {
                by: BlockedBy::User(a.clone())
            }
        );
        assert!(service.list_friends(&a).await.unwrap().is_empty());
        assert!(service.list_friends(&b).await.unwrap().is_empty());

        assert_eq!(service.send_request(&b, &a).await, Err(Error::Blocked));
    }

    #[tokio::test]
    async fn test_mutual_requests_become_one_friendship() {
        let (store, service) = setup();
        let (a, b) = (uid("alice"), uid("bob"));

        service.send_request(&a, &b).await.unwrap();
        let outcome = service.send_request(&b, &a).await.unwrap();
        assert_eq!(outcome.state, PairState::Friends);

        assert_eq!(service.list_friends(&a).await.unwrap(), vec![b.clone()]);
        assert_eq!(service.list_friends(&b).await.unwrap(), vec![a.clone()]);
        assert!(service.list_incoming_requests(&a).await.unwrap().is_empty());
        assert!(service.list_outgoing_requests(&a).await.unwrap().is_empty());
        assert_eq!(store.edge_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_sends_converge() {
        let (store, service) = setup();
        let (a, b) = (uid("alice"), uid("bob"));

        // Both sends observed an empty pair and wrote their records
        for (sender, recipient) in [(&a, &b), (&b, &a)] {
            store.write(sender, Relation::RequestsSent, recipient, true).await.unwrap();
            store.write(recipient, Relation::RequestsReceived, sender, true).await.unwrap();
        }

        assert_eq!(service.get_pair_state(&a, &b).await.unwrap(), PairState::Friends);
        assert_eq!(store.edge_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_opposite_sends_end_as_friends() {
        let (a, b) = (uid("alice"), uid("bob"));

        for _ in 0..100 {
            let memory = Arc::new(MemoryEdgeStore::with_users(&[a.clone(), b.clone()]));
            let racy = FlakyStore::new(memory.clone());
            racy.yield_between_steps(true);
            let service = Arc::new(service_with(racy, true));

            let send = |actor: UserId, target: UserId| {
                let service = service.clone();
                tokio::spawn(async move { service.send_request(&actor, &target).await })
            };
            let forward = send(a.clone(), b.clone());
            let backward = send(b.clone(), a.clone());

            for result in [forward.await.unwrap(), backward.await.unwrap()] {
                match result {
                    Ok(_) | Err(Error::AlreadyFriends) | Err(Error::AlreadyPending) => {}
                    Err(e) => panic!("unexpected send failure: {e}"),
                }
            }

            assert_eq!(service.get_pair_state(&a, &b).await.unwrap(), PairState::Friends);
            assert_eq!(memory.edge_count(), 2);
            assert!(PairSnapshot::read(&*memory, &a, &b).await.unwrap().is_consistent());
        }
    }

    #[tokio::test]
    async fn test_idempotent_replays() {
        let (_store, service) = setup();
        let (a, b) = (uid("alice"), uid("bob"));

        service.block_user(&a, &b).await.unwrap();
        assert_eq!(service.block_user(&a, &b).await, Err(Error::AlreadyBlocked));
        service.unblock_user(&a, &b).await.unwrap();

        service.send_request(&a, &b).await.unwrap();
        service.accept_request(&b, &a).await.unwrap();
        assert_eq!(service.accept_request(&b, &a).await, Err(Error::NoSuchRequest));
        assert_eq!(service.get_pair_state(&a, &b).await.unwrap(), PairState::Friends);
    }

    #[tokio::test]
    async fn test_projections() {
        let (_store, service) = setup();
        let (a, b, c) = (uid("alice"), uid("bob"), uid("carol"));

        service.send_request(&a, &c).await.unwrap();
        service.send_request(&a, &b).await.unwrap();
        service.block_user(&c, &b).await.unwrap();

        assert_eq!(
            service.list_outgoing_requests(&a).await.unwrap(),
            vec![b.clone(), c.clone()]
        );
        assert_eq!(service.list_incoming_requests(&b).await.unwrap(), vec![a.clone()]);
        assert_eq!(service.list_blocked(&c).await.unwrap(), vec![b.clone()]);
        assert!(service.is_blocked_either_way(&b, &c).await.unwrap());
        assert!(!service.is_blocked_either_way(&a, &c).await.unwrap());

        assert_eq!(
            service.list_friends(&uid("zoe")).await,
            Err(Error::NotFound("zoe".into()))
        );
    }

    #[tokio::test]
    async fn test_projection_repairs_listed_pairs() {
        let (store, service) = setup();
        let (a, b) = (uid("alice"), uid("bob"));

        // Orphaned receipt: bob's request record is gone
        store.write(&a, Relation::RequestsReceived, &b, true).await.unwrap();
        assert!(service.list_incoming_requests(&a).await.unwrap().is_empty());
        assert_eq!(store.edge_count(), 0);
    }

    #[tokio::test]
    async fn test_pair_state_validation() {
        let (_store, service) = setup();
        let a = uid("alice");

        assert_eq!(service.get_pair_state(&a, &a).await, Err(Error::SelfReference));
        assert_eq!(
            service.get_pair_state(&a, &uid("zoe")).await,
            Err(Error::NotFound("zoe".into()))
        );

        assert_eq!(
            service.is_blocked_either_way(&a, &a).await,
            Err(Error::SelfReference)
        );
        assert_eq!(
            service.is_blocked_either_way(&uid("zoe"), &a).await,
            Err(Error::NotFound("zoe".into()))
        );
        assert_eq!(
            service.is_blocked_either_way(&a, &uid("zoe")).await,
            Err(Error::NotFound("zoe".into()))
        );
    }

    #[tokio::test]
    async fn test_outcome_json() {
        let (_store, service) = setup();
        let outcome = service
            .send_request(&uid("alice"), &uid("bob"))
            .await
            .unwrap();

        let json = outcome.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["action"], "send_request");
        assert_eq!(value["state"]["state"], "PENDING");
        assert_eq!(value["state"]["from"], "alice");

        assert_eq!(Outcome::from_json(&json).unwrap(), outcome);
        assert_eq!(Action::Block.as_str(), "block");
    }

    #[tokio::test]
    async fn test_sqlite_backed_service() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kith.db");
        let store = Arc::new(
            crate::storage::SqliteEdgeStore::open(path.to_str())
                .await
                .unwrap(),
        );
        let (a, b) = (uid("alice"), uid("bob"));
        store.register(&a).await.unwrap();
        store.register(&b).await.unwrap();

        let service = service_with(store, true);
        service.send_request(&a, &b).await.unwrap();
        service.accept_request(&b, &a).await.unwrap();
        assert_eq!(service.list_friends(&a).await.unwrap(), vec![b.clone()]);
        service.remove_friend(&b, &a).await.unwrap();
        assert_eq!(service.get_pair_state(&a, &b).await.unwrap(), PairState::None);
    }

    // ------------------------------------------------------------------
    // Randomized operation sequences
    // ------------------------------------------------------------------

    const USERS: [&str; 4] = ["ann", "ben", "cat", "dan"];

    #[derive(Debug, Clone)]
    struct Step {
        op: u8,
        actor: usize,
        target: usize,
        /// Writes allowed before the store starts failing
        fail_after: Option<usize>,
    }

    fn step() -> impl Strategy<Value = Step> {
        (0u8..7, 0..USERS.len(), 0..USERS.len(), prop::option::of(0usize..4)).prop_map(
            |(op, actor, target, fail_after)| Step {
                op,
                actor,
                target,
                fail_after,
            },
        )
    }

    async fn run(service: &FriendsService, step: &Step) -> Result<Outcome> {
        let actor = uid(USERS[step.actor]);
        let target = uid(USERS[step.target]);
        match step.op {
            0 => service.send_request(&actor, &target).await,
            1 => service.accept_request(&actor, &target).await,
            2 => service.decline_request(&actor, &target).await,
            3 => service.cancel_request(&actor, &target).await,
            4 => service.remove_friend(&actor, &target).await,
            5 => service.block_user(&actor, &target).await,
            _ => service.unblock_user(&actor, &target).await,
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_random_sequences_converge_after_sweep(
            steps in prop::collection::vec(step(), 1..40),
            repair_on_read in any::<bool>(),
        ) {
            let users: Vec<UserId> = USERS.iter().map(|u| uid(u)).collect();
            let memory = Arc::new(MemoryEdgeStore::with_users(&users));
            let flaky = FlakyStore::new(memory.clone());
            let service = service_with(flaky.clone(), repair_on_read);

            let violations = tokio_test::block_on(async {
                for step in &steps {
                    if let Some(budget) = step.fail_after {
                        flaky.fail_after(budget);
                    }
                    let _ = run(&service, step).await;
                    flaky.heal();
                }

                let report = service.reconciler().sweep().await.unwrap();
                assert_eq!(report.failures, 0);

                let mut violations = Vec::new();
                for (i, a) in users.iter().enumerate() {
                    for b in &users[i + 1..] {
                        let snapshot = PairSnapshot::read(&*memory, a, b).await.unwrap();
                        if !snapshot.is_consistent() {
                            violations.push(snapshot);
                        }
                    }
                }
                violations
            });

            prop_assert!(violations.is_empty(), "inconsistent pairs: {:?}", violations);
        }
    }
}
