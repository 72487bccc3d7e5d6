//! # Database
//!
//! SQLite implementation of the edge store.
//!
//! ## Database Operations
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      DATABASE OPERATIONS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │  Relationship   │                                                   │
//! │  │     layer       │                                                   │
//! │  └────────┬────────┘                                                   │
//! │           │  read / read_all / write (one key at a time)               │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │ SqliteEdgeStore │  - one statement per call, autocommit             │
//! │  │   (this file)   │  - no statement spans two keys                    │
//! │  └────────┬────────┘                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │   SQLite DB     │  - In-memory for tests                            │
//! │  │                 │  - File for production                            │
//! │  └─────────────────┘                                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! SQLite could offer transactions, but the store exposes only
//! the single-key contract of the document store the engine is designed for.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{schema, EdgeStore, Relation, UserDirectory};
use crate::error::{Error, Result};
use crate::identity::UserId;

/// SQLite-backed [`EdgeStore`] and [`UserDirectory`]
#[derive(Clone)]
pub struct SqliteEdgeStore {
    /// The underlying SQLite connection
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEdgeStore {
    /// Open or create a database
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub async fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p).map_err(|e| {
                Error::StoreUnavailable(format!("Failed to open database: {}", e))
            })?,
            None => Connection::open_in_memory().map_err(|e| {
                Error::StoreUnavailable(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES).map_err(|e| {
                    Error::StoreUnavailable(format!("Failed to create tables: {}", e))
                })?;

                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| {
                    Error::StoreUnavailable(format!("Failed to set schema version: {}", e))
                })?;

                tracing::info!("Database schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(Error::StoreUnavailable(format!(
                    "Database schema version {} is newer than supported version {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(v) => {
                tracing::debug!("Database schema version: {}", v);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EdgeStore for SqliteEdgeStore {
    async fn read(&self, user: &UserId, relation: Relation, other: &UserId) -> Result<bool> {
        let conn = self.conn.lock();
        let present: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM edges WHERE user_id = ? AND relation = ? AND other_id = ?)",
                params![user.as_str(), relation.as_str(), other.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| Error::StoreUnavailable(format!("Failed to read edge: {}", e)))?;

        Ok(present)
    }

    async fn read_all(&self, user: &UserId, relation: Relation) -> Result<BTreeSet<UserId>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT other_id FROM edges WHERE user_id = ? AND relation = ? ORDER BY other_id",
            )
            .map_err(|e| Error::StoreUnavailable(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![user.as_str(), relation.as_str()], |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| Error::StoreUnavailable(format!("Failed to query edges: {}", e)))?;

        let mut others = BTreeSet::new();
        for row in rows {
            let raw =
                row.map_err(|e| Error::StoreUnavailable(format!("Failed to read edge: {}", e)))?;
            let other = UserId::new(raw)
                .map_err(|e| Error::Internal(format!("Corrupt edge row under {}: {}", user, e)))?;
            others.insert(other);
        }

        Ok(others)
    }

    async fn write(
        &self,
        user: &UserId,
        relation: Relation,
        other: &UserId,
        present: bool,
    ) -> Result<()> {
        let conn = self.conn.lock();

        if present {
            conn.execute(
                "INSERT INTO edges (user_id, relation, other_id, created_at) VALUES (?, ?, ?, ?)
                 ON CONFLICT(user_id, relation, other_id) DO NOTHING",
                params![
                    user.as_str(),
                    relation.as_str(),
                    other.as_str(),
                    crate::time::now_timestamp(),
                ],
            )
            .map_err(|e| Error::StoreUnavailable(format!("Failed to set edge: {}", e)))?;
        } else {
            conn.execute(
                "DELETE FROM edges WHERE user_id = ? AND relation = ? AND other_id = ?",
                params![user.as_str(), relation.as_str(), other.as_str()],
            )
            .map_err(|e| Error::StoreUnavailable(format!("Failed to delete edge: {}", e)))?;
        }

        Ok(())
    }
}

#[async_trait]
impl UserDirectory for SqliteEdgeStore {
    async fn contains(&self, user: &UserId) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE id = ?",
                params![user.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| Error::StoreUnavailable(format!("Failed to look up user: {}", e)))?;

        Ok(count > 0)
    }

    async fn register(&self, user: &UserId) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, created_at) VALUES (?, ?) ON CONFLICT(id) DO NOTHING",
            params![user.as_str(), crate::time::now_timestamp()],
        )
        .map_err(|e| Error::StoreUnavailable(format!("Failed to register user: {}", e)))?;

        Ok(())
    }

    async fn users(&self) -> Result<Vec<UserId>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id FROM users ORDER BY id")
            .map_err(|e| Error::StoreUnavailable(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| Error::StoreUnavailable(format!("Failed to query users: {}", e)))?;

        let mut users = Vec::new();
        for row in rows {
            let raw =
                row.map_err(|e| Error::StoreUnavailable(format!("Failed to read user: {}", e)))?;
            users.push(
                UserId::new(raw).map_err(|e| Error::Internal(format!("Corrupt user row: {}", e)))?,
            );
        }

        Ok(users)
    }
}

// ============================================================================
// TESTS
// ============================================================================
