//! # Identity Module
//!
//! User identifiers as seen by the relationship engine.
//!
//! Authentication and profiles live outside the engine. All the engine needs
//! is an opaque, stable, never-reused ID that can be embedded in a document
//! path:
//!
//! ```text
//! users/{user_id}/{relation}/{other_id}
//!        ───┬───              ───┬────
//!           └──── UserId ────────┘
//! ```
//!
//! Because `/` separates path segments, it may not appear inside an ID.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Maximum accepted length of a user ID, in bytes
pub const MAX_USER_ID_LEN: usize = 128;

/// Opaque, stable user identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Parse and validate a user ID
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidUserId("user ID must not be empty".into()));
        }
        if id.len() > MAX_USER_ID_LEN {
            return Err(Error::InvalidUserId(format!(
                "user ID exceeds {} bytes",
                MAX_USER_ID_LEN
            )));
        }
        if id.contains('/') {
            return Err(Error::InvalidUserId(format!(
                "user ID may not contain '/': {}",
                id
            )));
        }
        Ok(Self(id))
    }

    /// Borrow the raw ID
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for UserId {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl std::str::FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
