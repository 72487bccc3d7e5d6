//! # Database Schema
//!
//! SQL schema definitions for the SQLite edge store.
//!
//! ## Schema Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DATABASE SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐         ┌─────────────────────────────┐            │
//! │  │     users       │         │           edges             │            │
//! │  ├─────────────────┤         ├─────────────────────────────┤            │
//! │  │ id              │◄────────│ user_id     ┐               │            │
//! │  │ created_at      │         │ relation    ├ primary key   │            │
//! │  └─────────────────┘         │ other_id    ┘               │            │
//! │                              │ created_at                  │            │
//! │                              └─────────────────────────────┘            │
//! │                                                                         │
//! │  One row per document key users/{user_id}/{relation}/{other_id}.      │
//! │  Presence of the row is the boolean value of the key.                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no foreign key from `edges` to `users`: the
//! document store the engine models has none, and edge writes must never
//! fail because of directory state.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Users table
-- Registry of known user IDs
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    -- When the user was registered
    created_at INTEGER NOT NULL
);

-- Edges table
-- One row per present adjacency record
CREATE TABLE IF NOT EXISTS edges (
    -- Namespace owner of the record
    user_id TEXT NOT NULL,
    -- friends | friendRequestsSent | friendRequestsReceived | blocked
    relation TEXT NOT NULL,
    -- Counterpart the record points at
    other_id TEXT NOT NULL,
    -- When the record was first written
    created_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, relation, other_id),
    CONSTRAINT relation_name CHECK (
        relation IN ('friends', 'friendRequestsSent', 'friendRequestsReceived', 'blocked')
    ),
    CONSTRAINT no_self_edge CHECK (user_id <> other_id)
);
CREATE INDEX IF NOT EXISTS idx_edges_user_relation ON edges(user_id, relation);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_applies_cleanly_twice() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_TABLES).unwrap();
        conn.execute_batch(CREATE_TABLES).unwrap();
    }

    #[test]
    fn test_self_edges_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CREATE_TABLES).unwrap();

        let result = conn.execute(
            "INSERT INTO edges (user_id, relation, other_id, created_at) VALUES ('a', 'friends', 'a', 0)",
            [],
        );
        assert!(result.is_err());

        let result = conn.execute(
            "INSERT INTO edges (user_id, relation, other_id, created_at) VALUES ('a', 'likes', 'b', 0)",
            [],
        );
        assert!(result.is_err());
    }
}
