//! Pair snapshots and the logical pair-state derived from them.
//!
//! Everything here is a pure function of eight booleans: the four records
//! each user holds about the other. The only I/O is [`PairSnapshot::read`].
//!
//! ```text
//!              under A          under B
//!           ┌───────────┐    ┌───────────┐
//! friends   │ friends[B]│◄──►│ friends[A]│   symmetric
//! requests  │   sent[B] │───►│ recv[A]   │   A → B
//!           │   recv[B] │◄───│   sent[A] │   B → A
//! blocked   │ blocked[B]│    │ blocked[A]│   never mirrored
//!           └───────────┘    └───────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::identity::UserId;
use crate::storage::{EdgeStore, Relation};

/// The records one user holds about a single counterpart
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HalfRecord {
    /// `friends[other]`
    pub friends: bool,
    /// `friendRequestsSent[other]`
    pub sent: bool,
    /// `friendRequestsReceived[other]`
    pub received: bool,
    /// `blocked[other]`
    pub blocked: bool,
}

impl HalfRecord {
    /// Read the four records `user` holds about `other`
    pub async fn read<S: EdgeStore + ?Sized>(
        store: &S,
        user: &UserId,
        other: &UserId,
    ) -> Result<Self> {
        let (friends, sent, received, blocked) = futures::try_join!(
            store.read(user, Relation::Friends, other),
            store.read(user, Relation::RequestsSent, other),
            store.read(user, Relation::RequestsReceived, other),
            store.read(user, Relation::Blocked, other),
        )?;

        Ok(Self {
            friends,
            sent,
            received,
            blocked,
        })
    }

    /// Any request record, in either direction
    pub fn has_pending(&self) -> bool {
        self.sent || self.received
    }

    /// No record at all
    pub fn is_empty(&self) -> bool {
        !(self.friends || self.sent || self.received || self.blocked)
    }
}

/// Both halves of a pair, as observed at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairSnapshot {
    /// First user of the pair (the actor, for operations)
    pub a: UserId,
    /// Second user of the pair
    pub b: UserId,
    /// Records held under `a` about `b`
    pub a_side: HalfRecord,
    /// Records held under `b` about `a`
    pub b_side: HalfRecord,
}

impl PairSnapshot {
    /// Assemble a snapshot from already-read halves
    pub fn new(a: UserId, b: UserId, a_side: HalfRecord, b_side: HalfRecord) -> Self {
        Self {
            a,
            b,
            a_side,
            b_side,
        }
    }

    /// Read both halves of the pair
    ///
    /// The two halves are read concurrently; nothing guarantees they reflect
    /// the same instant.
    pub async fn read<S: EdgeStore + ?Sized>(store: &S, a: &UserId, b: &UserId) -> Result<Self> {
        let (a_side, b_side) = futures::try_join!(
            HalfRecord::read(store, a, b),
            HalfRecord::read(store, b, a),
        )?;

        Ok(Self::new(a.clone(), b.clone(), a_side, b_side))
    }

    /// Has either user blocked the other?
    pub fn is_blocked_either_way(&self) -> bool {
        self.a_side.blocked || self.b_side.blocked
    }

    /// At least one friends record exists
    pub fn friends_any(&self) -> bool {
        self.a_side.friends || self.b_side.friends
    }

    /// Both friends records exist
    pub fn friends_both(&self) -> bool {
        self.a_side.friends && self.b_side.friends
    }

    /// Some record of a request from `a` to `b` exists
    pub fn pending_from_a(&self) -> bool {
        self.a_side.sent || self.b_side.received
    }

    /// Some record of a request from `b` to `a` exists
    pub fn pending_from_b(&self) -> bool {
        self.b_side.sent || self.a_side.received
    }

    /// Any request record, in either direction
    pub fn pending_any(&self) -> bool {
        self.a_side.has_pending() || self.b_side.has_pending()
    }

    /// Detect every way the two halves disagree with the invariants
    ///
    /// Shapes are reported with precedence: a block violation hides
    /// everything else, and once a friends record exists request records are
    /// reported only as [`Divergence::PendingAlongsideFriendship`]. This keeps
    /// the repairs for the reported shapes from contradicting each other.
    pub fn divergences(&self) -> Vec<Divergence> {
        if self.is_blocked_either_way() && (self.friends_any() || self.pending_any()) {
            return vec![Divergence::BlockViolation];
        }

        let mut found = Vec::new();

        if self.friends_any() {
            if self.a_side.friends != self.b_side.friends {
                let (holder, missing) = if self.a_side.friends {
                    (&self.a, &self.b)
                } else {
                    (&self.b, &self.a)
                };
                found.push(Divergence::HalfFriendship {
                    holder: holder.clone(),
                    missing: missing.clone(),
                });
            }
            if self.pending_any() {
                found.push(Divergence::PendingAlongsideFriendship);
            }
            return found;
        }

        if self.a_side.sent && self.b_side.sent {
            return vec![Divergence::ReciprocalPending];
        }

        let directions = [
            (&self.a, &self.a_side, &self.b, &self.b_side),
            (&self.b, &self.b_side, &self.a, &self.a_side),
        ];
        for (sender, sender_side, recipient, recipient_side) in directions {
            if sender_side.sent && !recipient_side.received {
                found.push(Divergence::UnmirroredRequest {
                    sender: sender.clone(),
                    recipient: recipient.clone(),
                });
            }
            if recipient_side.received && !sender_side.sent {
                found.push(Divergence::OrphanedReceipt {
                    sender: sender.clone(),
                    recipient: recipient.clone(),
                });
            }
        }

        found
    }

    /// Is the pair free of divergences?
    pub fn is_consistent(&self) -> bool {
        self.divergences().is_empty()
    }

    /// Derive the logical pair-state
    pub fn state(&self) -> PairState {
        let divergences = self.divergences();
        if !divergences.is_empty() {
            return PairState::Inconsistent { divergences };
        }

        match (self.a_side.blocked, self.b_side.blocked) {
            (true, true) => {
                return PairState::Blocked {
                    by: BlockedBy::Both,
                }
            }
            (true, false) => {
                return PairState::Blocked {
                    by: BlockedBy::User(self.a.clone()),
                }
            }
            (false, true) => {
                return PairState::Blocked {
                    by: BlockedBy::User(self.b.clone()),
                }
            }
            (false, false) => {}
        }

        if self.friends_both() {
            PairState::Friends
        } else if self.a_side.sent {
            PairState::Pending {
                from: self.a.clone(),
            }
        } else if self.b_side.sent {
            PairState::Pending {
                from: self.b.clone(),
            }
        } else {
            PairState::None
        }
    }
}

/// A way in which the two halves of a pair disagree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Divergence {
    /// Friends or request records coexist with a block on either side
    BlockViolation,
    /// Each user holds a sent request to the other
    ReciprocalPending,
    /// Only one user holds the friends record
    HalfFriendship {
        /// User holding `friends[missing]`
        holder: UserId,
        /// User lacking `friends[holder]`
        missing: UserId,
    },
    /// A friends record coexists with request records
    PendingAlongsideFriendship,
    /// A sent request whose received mirror was never written
    UnmirroredRequest {
        /// Holder of the sent record
        sender: UserId,
        /// User lacking the received record
        recipient: UserId,
    },
    /// A received record whose sent counterpart is gone
    OrphanedReceipt {
        /// User lacking the sent record
        sender: UserId,
        /// Holder of the received record
        recipient: UserId,
    },
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Divergence::BlockViolation => f.write_str("relationship edges alongside a block"),
            Divergence::ReciprocalPending => f.write_str("reciprocal pending requests"),
            Divergence::HalfFriendship { holder, missing } => {
                write!(f, "friendship held by {} but not by {}", holder, missing)
            }
            Divergence::PendingAlongsideFriendship => {
                f.write_str("pending request alongside friendship")
            }
            Divergence::UnmirroredRequest { sender, recipient } => write!(
                f,
                "request {} -> {} missing its received record",
                sender, recipient
            ),
            Divergence::OrphanedReceipt { sender, recipient } => write!(
                f,
                "request {} -> {} missing its sent record",
                sender, recipient
            ),
        }
    }
}

/// Which side of a blocked pair holds the block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockedBy {
    /// Exactly one user has blocked the other
    User(UserId),
    /// Each user has blocked the other
    Both,
}

/// Logical relationship status of an unordered pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PairState {
    /// No relationship
    None,
    /// A friend request awaits a response
    Pending {
        /// The requesting user
        from: UserId,
    },
    /// Mutual friendship
    Friends,
    /// At least one user has blocked the other
    Blocked {
        /// The blocking side
        by: BlockedBy,
    },
    /// The two halves disagree; the reconciler will repair this
    Inconsistent {
        /// Everything detected
        divergences: Vec<Divergence>,
    },
}

impl PairState {
    /// Short uppercase label
    pub fn label(&self) -> &'static str {
        match self {
            PairState::None => "NONE",
            PairState::Pending { .. } => "PENDING",
            PairState::Friends => "FRIENDS",
            PairState::Blocked { .. } => "BLOCKED",
            PairState::Inconsistent { .. } => "INCONSISTENT",
        }
    }

    /// Not `Inconsistent`
    pub fn is_valid(&self) -> bool {
        !matches!(self, PairState::Inconsistent { .. })
    }
}

impl fmt::Display for PairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairState::Pending { from } => write!(f, "PENDING(from={})", from),
            PairState::Blocked {
                by: BlockedBy::User(user),
            } => write!(f, "BLOCKED(by={})", user),
            PairState::Blocked {
                by: BlockedBy::Both,
            } => f.write_str("BLOCKED(by=both)"),
            PairState::Inconsistent { divergences } => {
                write!(f, "INCONSISTENT({} divergences)", divergences.len())
            }
            other => f.write_str(other.label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn half(friends: bool, sent: bool, received: bool, blocked: bool) -> HalfRecord {
        HalfRecord {
            friends,
            sent,
            received,
            blocked,
        }
    }

    fn pair(a_side: HalfRecord, b_side: HalfRecord) -> PairSnapshot {
        PairSnapshot::new(uid("alice"), uid("bob"), a_side, b_side)
    }

    const EMPTY: HalfRecord = HalfRecord {
        friends: false,
        sent: false,
        received: false,
        blocked: false,
    };

    #[test]
    fn test_valid_states() {
        assert_eq!(pair(EMPTY, EMPTY).state(), PairState::None);

        let friends = half(true, false, false, false);
        assert_eq!(pair(friends, friends).state(), PairState::Friends);

        let pending = pair(half(false, true, false, false), half(false, false, true, false));
        assert_eq!(pending.state(), PairState::Pending { from: uid("alice") });

        let pending = pair(half(false, false, true, false), half(false, true, false, false));
        assert_eq!(pending.state(), PairState::Pending { from: uid("bob") });
    }

    #[test]
    fn test_blocked_states() {
        let blocked = half(false, false, false, true);
        assert_eq!(
            pair(blocked, EMPTY).state(),
            PairState::Blocked {
                by: BlockedBy::User(uid("alice"))
            }
        );
        assert_eq!(
            pair(EMPTY, blocked).state(),
            PairState::Blocked {
                by: BlockedBy::User(uid("bob"))
            }
        );
        assert_eq!(
            pair(blocked, blocked).state(),
            PairState::Blocked {
                by: BlockedBy::Both
            }
        );
    }

    #[test]
    fn test_block_violation_hides_other_shapes() {
        let snapshot = pair(half(true, true, false, true), EMPTY);
        assert_eq!(snapshot.divergences(), vec![Divergence::BlockViolation]);
        assert!(!snapshot.state().is_valid());
    }

    #[test]
    fn test_half_friendship() {
        let snapshot = pair(EMPTY, half(true, false, false, false));
        assert_eq!(
            snapshot.divergences(),
            vec![Divergence::HalfFriendship {
                holder: uid("bob"),
                missing: uid("alice"),
            }]
        );
    }

    #[test]
    fn test_friendship_supersedes_request_shapes() {
        // An unmirrored request next to a friendship is only reported as
        // pending-alongside-friendship
        let snapshot = pair(half(true, true, false, false), half(true, false, false, false));
        assert_eq!(
            snapshot.divergences(),
            vec![Divergence::PendingAlongsideFriendship]
        );
    }

    #[test]
    fn test_reciprocal_pending() {
        let snapshot = pair(half(false, true, true, false), half(false, true, true, false));
        assert_eq!(snapshot.divergences(), vec![Divergence::ReciprocalPending]);

        // Sent records alone are enough
        let snapshot = pair(half(false, true, false, false), half(false, true, false, false));
        assert_eq!(snapshot.divergences(), vec![Divergence::ReciprocalPending]);
    }

    #[test]
    fn test_request_mirroring_shapes() {
        let unmirrored = pair(half(false, true, false, false), EMPTY);
        assert_eq!(
            unmirrored.divergences(),
            vec![Divergence::UnmirroredRequest {
                sender: uid("alice"),
                recipient: uid("bob"),
            }]
        );

        let orphaned = pair(EMPTY, half(false, false, true, false));
        assert_eq!(
            orphaned.divergences(),
            vec![Divergence::OrphanedReceipt {
                sender: uid("alice"),
                recipient: uid("bob"),
            }]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            PairState::Pending { from: uid("alice") }.to_string(),
            "PENDING(from=alice)"
        );
        assert_eq!(
            PairState::Blocked {
                by: BlockedBy::Both
            }
            .to_string(),
            "BLOCKED(by=both)"
        );
        assert_eq!(PairState::Friends.to_string(), "FRIENDS");
    }

    #[test]
    fn test_state_json_shape() {
        let json = serde_json::to_value(PairState::Pending { from: uid("alice") }).unwrap();
        assert_eq!(json, serde_json::json!({ "state": "PENDING", "from": "alice" }));

        let json = serde_json::to_value(PairState::Friends).unwrap();
        assert_eq!(json, serde_json::json!({ "state": "FRIENDS" }));
    }

    /// Exhaustive check over all 256 combinations of the eight records
    #[test]
    fn test_every_snapshot_is_classified() {
        for bits in 0u16..256 {
            let bit = |i: u16| bits & (1 << i) != 0;
            let snapshot = pair(
                half(bit(0), bit(1), bit(2), bit(3)),
                half(bit(4), bit(5), bit(6), bit(7)),
            );
            let state = snapshot.state();

            if state.is_valid() {
                // Valid states satisfy invariants 2-5
                assert_eq!(snapshot.a_side.friends, snapshot.b_side.friends);
                assert_eq!(snapshot.a_side.sent, snapshot.b_side.received);
                assert_eq!(snapshot.b_side.sent, snapshot.a_side.received);
                if snapshot.friends_any() {
                    assert!(!snapshot.pending_any());
                }
                if snapshot.is_blocked_either_way() {
                    assert!(!snapshot.friends_any() && !snapshot.pending_any());
                }
            }
        }
    }
}
