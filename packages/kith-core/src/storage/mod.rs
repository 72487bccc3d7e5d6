//! # Storage Module
//!
//! The edge store contract and its implementations.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  EdgeStore (hierarchical document store contract)               │   │
//! │  │  ─────────────────────────────────────────────                   │   │
//! │  │                                                                 │   │
//! │  │  users/{user}/friends/{other}                  -> true          │   │
//! │  │  users/{user}/friendRequestsSent/{other}       -> true          │   │
//! │  │  users/{user}/friendRequestsReceived/{other}   -> true          │   │
//! │  │  users/{user}/blocked/{other}                  -> true          │   │
//! │  │                                                                 │   │
//! │  │  • point read / write / delete of one key                      │   │
//! │  │  • set read of all keys under (user, relation)                 │   │
//! │  │  • NO transactions, NO compare-and-swap                        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌──────────────────────────┐      ┌──────────────────────────────┐    │
//! │  │  MemoryEdgeStore         │      │  SqliteEdgeStore             │    │
//! │  │  DashMap, process-local  │      │  rusqlite, file or memory    │    │
//! │  └──────────────────────────┘      └──────────────────────────────┘    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every key is written independently. A multi-key operation that fails
//! part-way leaves the earlier writes in place; the relationship layer is
//! built so that any such prefix can be healed or replayed.

mod database;
mod memory;
mod schema;

#[cfg(test)]
pub(crate) mod flaky;

pub use database::SqliteEdgeStore;
pub use memory::MemoryEdgeStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::identity::UserId;

/// One of the four per-user adjacency sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Relation {
    /// `friends[other]`: present under both users or neither
    #[serde(rename = "friends")]
    Friends,
    /// `friendRequestsSent[other]`: present only under the sender
    #[serde(rename = "friendRequestsSent")]
    RequestsSent,
    /// `friendRequestsReceived[other]`: present only under the recipient
    #[serde(rename = "friendRequestsReceived")]
    RequestsReceived,
    /// `blocked[other]`: present only under the blocker
    #[serde(rename = "blocked")]
    Blocked,
}

impl Relation {
    /// Every relation, in storage order
    pub const ALL: [Relation; 4] = [
        Relation::Friends,
        Relation::RequestsSent,
        Relation::RequestsReceived,
        Relation::Blocked,
    ];

    /// Document path segment for this relation
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Friends => "friends",
            Relation::RequestsSent => "friendRequestsSent",
            Relation::RequestsReceived => "friendRequestsReceived",
            Relation::Blocked => "blocked",
        }
    }

    /// Parse a document path segment
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "friends" => Some(Relation::Friends),
            "friendRequestsSent" => Some(Relation::RequestsSent),
            "friendRequestsReceived" => Some(Relation::RequestsReceived),
            "blocked" => Some(Relation::Blocked),
            _ => None,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full document path of a single edge record
pub fn edge_path(user: &UserId, relation: Relation, other: &UserId) -> String {
    format!("users/{}/{}/{}", user, relation, other)
}

/// Single-key access to per-user adjacency records
///
/// Implementations must make each `write` durable on its own and must not
/// assume anything about the visibility of other keys.
#[async_trait]
pub trait EdgeStore: Send + Sync {
    /// Is `relation[other]` present under `user`?
    async fn read(&self, user: &UserId, relation: Relation, other: &UserId) -> Result<bool>;

    /// Every `other` present under `(user, relation)`
    async fn read_all(&self, user: &UserId, relation: Relation) -> Result<BTreeSet<UserId>>;

    /// Set (`present = true`) or delete (`present = false`) one record
    async fn write(
        &self,
        user: &UserId,
        relation: Relation,
        other: &UserId,
        present: bool,
    ) -> Result<()>;
}

/// The user registry the engine validates against
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Is this a known user?
    async fn contains(&self, user: &UserId) -> Result<bool>;

    /// Register a user; registering twice is a no-op
    async fn register(&self, user: &UserId) -> Result<()>;

    /// All known users, sorted
    async fn users(&self) -> Result<Vec<UserId>>;
}

/// A backend that provides both the edge store and the user directory
pub trait Store: EdgeStore + UserDirectory {}

impl<T: EdgeStore + UserDirectory + ?Sized> Store for T {}

/// Shared handle to a store
pub type SharedStore = Arc<dyn Store>;

/// A single primitive write, as planned by the relationship layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeWrite {
    /// Namespace owner of the record
    pub user: UserId,
    /// Which adjacency set
    pub relation: Relation,
    /// Counterpart the record points at
    pub other: UserId,
    /// `true` to set, `false` to delete
    pub present: bool,
}

impl EdgeWrite {
    /// Plan setting `relation[other]` under `user`
    pub fn set(user: &UserId, relation: Relation, other: &UserId) -> Self {
        Self {
            user: user.clone(),
            relation,
            other: other.clone(),
            present: true,
        }
    }

    /// Plan deleting `relation[other]` under `user`
    pub fn clear(user: &UserId, relation: Relation, other: &UserId) -> Self {
        Self {
            user: user.clone(),
            relation,
            other: other.clone(),
            present: false,
        }
    }

    /// Issue this write against a store
    pub async fn apply<S: EdgeStore + ?Sized>(&self, store: &S) -> Result<()> {
        tracing::trace!(
            path = %edge_path(&self.user, self.relation, &self.other),
            present = self.present,
            "edge write"
        );
        store
            .write(&self.user, self.relation, &self.other, self.present)
            .await
    }
}

impl fmt::Display for EdgeWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = if self.present { "set" } else { "delete" };
        write!(f, "{} {}", op, edge_path(&self.user, self.relation, &self.other))
    }
}

/// Apply a sequence of writes in order, stopping at the first failure
///
/// Returns how many writes were applied.
pub async fn apply_all<S: EdgeStore + ?Sized>(store: &S, writes: &[EdgeWrite]) -> Result<usize> {
    for write in writes {
        write.apply(store).await?;
    }
    Ok(writes.len())
}

/// Storage configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file (None for a process-local store)
    pub database_path: Option<String>,
}

/// Open the store selected by the configuration
///
/// A configured path opens (or creates) a SQLite database; otherwise a
/// process-local in-memory store is returned.
pub async fn open(config: &StorageConfig) -> Result<SharedStore> {
    match config.database_path.as_deref() {
        Some(path) => {
            let store = SqliteEdgeStore::open(Some(path)).await?;
            tracing::info!(path, "Opened SQLite edge store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::info!("Using in-memory edge store");
            Ok(Arc::new(MemoryEdgeStore::new()))
        }
    }
}
