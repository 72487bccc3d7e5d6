//! Ordered write sequences for every multi-key transition.
//!
//! Operations and the reconciler build their writes from these so a replay,
//! a resumed operation and a repair all issue the same keys in the same
//! order. Ordering rules:
//!
//! - a request is created sender record first, recipient record second
//! - a request is torn down sender record first, recipient record second
//! - a friendship is written actor record first
//!
//! With these rules an interrupted creation leaves an unmirrored request
//! (completed by repair) and an interrupted teardown leaves an orphaned
//! receipt (deleted by repair). Either way the sender's record decides.

use crate::identity::UserId;
use crate::storage::{EdgeWrite, Relation};

/// `sender` asks `recipient`
pub fn open_request(sender: &UserId, recipient: &UserId) -> Vec<EdgeWrite> {
    vec![
        EdgeWrite::set(sender, Relation::RequestsSent, recipient),
        EdgeWrite::set(recipient, Relation::RequestsReceived, sender),
    ]
}

/// Remove both records of the request from `sender` to `recipient`
pub fn withdraw_request(sender: &UserId, recipient: &UserId) -> Vec<EdgeWrite> {
    vec![
        EdgeWrite::clear(sender, Relation::RequestsSent, recipient),
        EdgeWrite::clear(recipient, Relation::RequestsReceived, sender),
    ]
}

/// Remove every request record between the pair, `a`'s outgoing first
pub fn withdraw_all_requests(a: &UserId, b: &UserId) -> Vec<EdgeWrite> {
    let mut writes = withdraw_request(a, b);
    writes.extend(withdraw_request(b, a));
    writes
}

/// Write both friends records
pub fn befriend(a: &UserId, b: &UserId) -> Vec<EdgeWrite> {
    vec![
        EdgeWrite::set(a, Relation::Friends, b),
        EdgeWrite::set(b, Relation::Friends, a),
    ]
}

/// Delete both friends records
pub fn unfriend(a: &UserId, b: &UserId) -> Vec<EdgeWrite> {
    vec![
        EdgeWrite::clear(a, Relation::Friends, b),
        EdgeWrite::clear(b, Relation::Friends, a),
    ]
}

/// Everything a block removes, once the block record itself is written
///
/// Requests go before the friendship so that a cascade cut short never
/// leaves a request next to a half-deleted friendship.
pub fn block_cascade(blocker: &UserId, target: &UserId) -> Vec<EdgeWrite> {
    let mut writes = withdraw_all_requests(blocker, target);
    writes.extend(unfriend(blocker, target));
    writes
}

/// Turn reciprocal requests into a friendship
pub fn collapse_reciprocal(a: &UserId, b: &UserId) -> Vec<EdgeWrite> {
    let mut writes = withdraw_all_requests(a, b);
    writes.extend(befriend(a, b));
    writes
}
