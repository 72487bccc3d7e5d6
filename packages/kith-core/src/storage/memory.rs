//! Process-local edge store.
//!
//! Uses DashMap for concurrent access. Each `(user, relation)` bucket is an
//! independent entry, so writers touching different users never contend.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{EdgeStore, Relation, UserDirectory};
use crate::error::Result;
use crate::identity::UserId;

/// In-memory implementation of [`EdgeStore`] and [`UserDirectory`]
#[derive(Clone, Default)]
pub struct MemoryEdgeStore {
    /// (user, relation) → set of counterparts
    edges: Arc<DashMap<(UserId, Relation), BTreeSet<UserId>>>,

    /// user → registration timestamp
    users: Arc<DashMap<UserId, i64>>,
}

impl MemoryEdgeStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the given users already registered
    pub fn with_users<'a>(users: impl IntoIterator<Item = &'a UserId>) -> Self {
        let store = Self::new();
        let now = crate::time::now_timestamp();
        for user in users {
            store.users.insert(user.clone(), now);
        }
        store
    }

    /// Total number of edge records, across all users and relations
    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(|entry| entry.value().len()).sum()
    }
}

#[async_trait]
impl EdgeStore for MemoryEdgeStore {
    async fn read(&self, user: &UserId, relation: Relation, other: &UserId) -> Result<bool> {
        Ok(self
            .edges
            .get(&(user.clone(), relation))
            .map(|set| set.contains(other))
            .unwrap_or(false))
    }

    async fn read_all(&self, user: &UserId, relation: Relation) -> Result<BTreeSet<UserId>> {
        Ok(self
            .edges
            .get(&(user.clone(), relation))
            .map(|set| set.clone())
            .unwrap_or_default())
    }

    async fn write(
        &self,
        user: &UserId,
        relation: Relation,
        other: &UserId,
        present: bool,
    ) -> Result<()> {
        let key = (user.clone(), relation);
        if present {
            self.edges.entry(key).or_default().insert(other.clone());
        } else {
            // Drop empty buckets so enumeration stays proportional to live edges
            self.edges.remove_if_mut(&key, |_, set| {
                set.remove(other);
                set.is_empty()
            });
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MemoryEdgeStore {
    async fn contains(&self, user: &UserId) -> Result<bool> {
        Ok(self.users.contains_key(user))
    }

    async fn register(&self, user: &UserId) -> Result<()> {
        self.users
            .entry(user.clone())
            .or_insert_with(crate::time::now_timestamp);
        Ok(())
    }

    async fn users(&self) -> Result<Vec<UserId>> {
        let mut users: Vec<UserId> = self.users.iter().map(|entry| entry.key().clone()).collect();
        users.sort();
        Ok(users)
    }
}
