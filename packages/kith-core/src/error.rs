//! # Error Handling
//!
//! Error types for Kith Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Validation Errors (rejected before any write)                     │
//! │  │   ├── SelfReference         - Actor and target are the same user    │
//! │  │   ├── NotFound              - Unknown user ID                       │
//! │  │   └── InvalidUserId         - Malformed user ID                     │
//! │  │                                                                      │
//! │  ├── Relationship Errors                                               │
//! │  │   ├── AlreadyFriends        - Pair is already FRIENDS               │
//! │  │   ├── NotFriends            - Pair is not FRIENDS                   │
//! │  │   ├── AlreadyPending        - Request already sent                  │
//! │  │   ├── NoSuchRequest         - No matching pending request           │
//! │  │   ├── AlreadyBlocked        - Target already blocked by actor       │
//! │  │   ├── NotBlocked            - Target not blocked by actor           │
//! │  │   └── Blocked               - Refused because of a block            │
//! │  │                                                                      │
//! │  ├── Storage Errors                                                    │
//! │  │   └── StoreUnavailable      - Backend transport failure             │
//! │  │                                                                      │
//! │  └── Internal Errors                                                   │
//! │      ├── SerializationError    - JSON encoding failed                  │
//! │      └── Internal              - Should not happen                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A `StoreUnavailable` returned in the middle of a multi-write operation
//! leaves a prefix of the writes applied. That prefix is always either a
//! valid state or one the reconciler knows how to heal, so callers may simply
//! re-invoke the operation.

use thiserror::Error;

/// Result type alias for Kith Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Kith Core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ========================================================================
    // Validation Errors (100-199)
    // ========================================================================

    /// Actor and target are the same user
    #[error("A user cannot form a relationship with themselves.")]
    SelfReference,

    /// Unknown user ID
    #[error("User not found: {0}")]
    NotFound(String),

    /// Malformed user ID
    #[error("Invalid user ID: {0}")]
    InvalidUserId(String),

    // ========================================================================
    // Relationship Errors (200-299)
    // ========================================================================

    /// Already friends with this user
    #[error("Already friends with this user.")]
    AlreadyFriends,

    /// Not friends with this user
    #[error("Not friends with this user.")]
    NotFriends,

    /// Friend request already pending
    #[error("A friend request to this user is already pending.")]
    AlreadyPending,

    /// No matching pending request
    #[error("No such friend request.")]
    NoSuchRequest,

    /// Target already blocked by the actor
    #[error("This user is already blocked.")]
    AlreadyBlocked,

    /// Target is not blocked by the actor
    #[error("This user is not blocked.")]
    NotBlocked,

    /// Action refused because one side has blocked the other
    #[error("Action refused: one of the users has blocked the other.")]
    Blocked,

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// Backend transport or storage failure
    #[error("Edge store unavailable: {0}")]
    StoreUnavailable(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// - 100-199: Validation
    /// - 200-299: Relationship
    /// - 400-499: Storage
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Validation (100-199)
            Error::SelfReference => 100,
            Error::NotFound(_) => 101,
            Error::InvalidUserId(_) => 102,

            // Relationship (200-299)
            Error::AlreadyFriends => 200,
            Error::NotFriends => 201,
            Error::AlreadyPending => 202,
            Error::NoSuchRequest => 203,
            Error::AlreadyBlocked => 204,
            Error::NotBlocked => 205,
            Error::Blocked => 206,

            // Storage (400-499)
            Error::StoreUnavailable(_) => 400,

            // Internal (900-999)
            Error::SerializationError(_) => 900,
            Error::Internal(_) => 901,
        }
    }

    /// Stable machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::SelfReference => "SelfReference",
            Error::NotFound(_) => "NotFound",
            Error::InvalidUserId(_) => "InvalidUserId",
            Error::AlreadyFriends => "AlreadyFriends",
            Error::NotFriends => "NotFriends",
            Error::AlreadyPending => "AlreadyPending",
            Error::NoSuchRequest => "NoSuchRequest",
            Error::AlreadyBlocked => "AlreadyBlocked",
            Error::NotBlocked => "NotBlocked",
            Error::Blocked => "Blocked",
            Error::StoreUnavailable(_) => "StoreUnavailable",
            Error::SerializationError(_) => "SerializationError",
            Error::Internal(_) => "Internal",
        }
    }

    /// Check if this error is recoverable
    ///
    /// Only store failures are worth re-invoking the operation for; every
    /// other kind describes the current relationship state.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_))
    }

    /// Check if this error requires user action
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            Error::Blocked | Error::AlreadyBlocked | Error::NotFriends | Error::NoSuchRequest
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::StoreUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
