//! # Kith Core
//!
//! A relationship-graph engine: friend requests, friendships and blocks
//! between users, kept consistent over a document store that offers only
//! single-key reads and writes.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KITH CORE MODULES                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                        Friends                                  │   │
//! │  │  FriendsService: operations + projections, Outcome results     │   │
//! │  └──────────────────────────────┬──────────────────────────────────┘   │
//! │                                 │                                       │
//! │  ┌──────────────────────────────┴──────────────────────────────────┐   │
//! │  │                      Relationship                               │   │
//! │  │                                                                 │   │
//! │  │  ┌─────────────┐  ┌─────────────┐  ┌───────────────────────┐   │   │
//! │  │  │  Request    │  │   Block     │  │     Reconciler        │   │   │
//! │  │  │  Lifecycle  │  │   Policy    │  │                       │   │   │
//! │  │  │ - send      │  │ - block     │  │ - detect divergences  │   │   │
//! │  │  │ - accept    │  │ - unblock   │  │ - repair pairs        │   │   │
//! │  │  │ - decline   │  │ - guard     │  │ - read-repair         │   │   │
//! │  │  │ - cancel    │  │             │  │ - background sweep    │   │   │
//! │  │  └─────────────┘  └─────────────┘  └───────────────────────┘   │   │
//! │  └──────────────────────────────┬──────────────────────────────────┘   │
//! │                                 │                                       │
//! │  ┌─────────────┐  ┌─────────────┴──────────────────────────────────┐   │
//! │  │  Identity   │  │                  Storage                       │   │
//! │  │             │  │                                                │   │
//! │  │ - UserId    │  │ - EdgeStore / UserDirectory contracts          │   │
//! │  │             │  │ - MemoryEdgeStore (DashMap)                    │   │
//! │  │             │  │ - SqliteEdgeStore (rusqlite)                   │   │
//! │  └─────────────┘  └────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`identity`] - Validated user identifiers
//! - [`storage`] - Edge store contract and backends
//! - [`relationship`] - Pair state, operations and reconciliation
//! - [`friends`] - Operation surface for collaborators
//!
//! ## Consistency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CONSISTENCY MODEL                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Each relationship fact is stored twice, once under each user.         │
//! │  The store cannot write both keys atomically, so:                      │
//! │                                                                         │
//! │  1. Every operation writes in a fixed order (sender record first).     │
//! │  2. Every prefix of those writes is a state the reconciler can map    │
//! │     back to a valid pair state.                                        │
//! │  3. Reads repair what they see; a periodic sweep repairs the rest.    │
//! │  4. Replaying any operation is safe.                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod error;
pub mod friends;
pub mod identity;
pub mod relationship;
pub mod storage;
/// Time utilities.
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use error::{Error, Result};
pub use friends::{Action, FriendsService, Outcome};
pub use identity::UserId;
pub use relationship::{BlockedBy, Divergence, PairState, Reconciler, SweepReport};
pub use storage::{SharedStore, StorageConfig};

// ============================================================================
// ENGINE
// ============================================================================

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Configuration for an [`Engine`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Repair each pair an operation or projection reads
    pub reconcile_on_read: bool,
    /// Seconds between background sweeps; 0 disables the sweeper
    pub sweep_interval_secs: u64,
    /// Pairs reconciled concurrently by a sweep
    pub sweep_concurrency: usize,
    /// Backing store selection
    pub storage: StorageConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconcile_on_read: true,
            sweep_interval_secs: 300,
            sweep_concurrency: relationship::DEFAULT_SWEEP_CONCURRENCY,
            storage: StorageConfig::default(),
        }
    }
}

/// A running relationship engine: one store, one reconciler, one service
///
/// ## Lifecycle
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                          ENGINE LIFECYCLE                               │
/// ├─────────────────────────────────────────────────────────────────────────┤
/// │                                                                         │
/// │  1. Open                                                               │
/// │     ┌─────────────┐                                                    │
/// │     │ Engine::    │──► Open the configured store                       │
/// │     │ open()      │──► Build reconciler and service                    │
/// │     └─────────────┘                                                    │
/// │            │                                                           │
/// │            ▼                                                           │
/// │  2. Start sweeper (optional)                                           │
/// │     ┌─────────────┐                                                    │
/// │     │ start_      │──► Periodic sweep on the tokio runtime             │
/// │     │ sweeper()   │                                                    │
/// │     └─────────────┘                                                    │
/// │            │                                                           │
/// │            ▼                                                           │
/// │  3. Serve operations through friends()                                 │
/// │            │                                                           │
/// │            ▼                                                           │
/// │  4. Shutdown                                                           │
/// │     ┌─────────────┐                                                    │
/// │     │ shutdown()  │──► Stop the sweeper                                │
/// │     └─────────────┘                                                    │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub struct Engine {
    /// Configuration the engine was opened with
    config: EngineConfig,
    /// Backing store
    store: SharedStore,
    /// Shared with the service
    reconciler: Arc<Reconciler>,
    /// Operation surface
    friends: FriendsService,
    /// Background sweep task, while running
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Open the store named by the configuration and build an engine on it
    pub async fn open(config: EngineConfig) -> Result<Self> {
        tracing::info!("Opening Kith engine v{}", version());
        let store = storage::open(&config.storage).await?;
        Ok(Self::with_store(store, config))
    }

    /// Build an engine over an existing store
    pub fn with_store(store: SharedStore, config: EngineConfig) -> Self {
        let reconciler = Arc::new(
            Reconciler::new(store.clone())
                .with_repair_on_read(config.reconcile_on_read)
                .with_sweep_concurrency(config.sweep_concurrency),
        );
        let friends = FriendsService::new(store.clone(), reconciler.clone());

        Self {
            config,
            store,
            reconciler,
            friends,
            sweeper: Mutex::new(None),
        }
    }

    /// The configuration in effect
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The operation surface
    pub fn friends(&self) -> &FriendsService {
        &self.friends
    }

    /// The reconciler, for on-demand sweeps
    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// The backing store
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Add a user to the directory
    pub async fn register_user(&self, user: &UserId) -> Result<()> {
        self.store.register(user).await?;
        tracing::debug!(user = %user, "User registered");
        Ok(())
    }

    /// Start the background sweeper
    ///
    /// Returns `false` if the sweeper is disabled or already running. Must be
    /// called from within a tokio runtime.
    pub fn start_sweeper(&self) -> bool {
        if self.config.sweep_interval_secs == 0 {
            tracing::debug!("Background sweeper disabled");
            return false;
        }

        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return false;
        }

        let every = Duration::from_secs(self.config.sweep_interval_secs);
        *sweeper = Some(self.reconciler.spawn_sweeper(every));
        tracing::info!("Background sweeper started (every {}s)", self.config.sweep_interval_secs);
        true
    }

    /// Is the background sweeper running?
    pub fn sweeper_running(&self) -> bool {
        self.sweeper.lock().is_some()
    }

    /// Stop background work
    ///
    /// Dropping the engine also stops the sweeper, without waiting for it.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down Kith engine");

        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            handle.abort();
            // Aborted tasks resolve with a cancellation error
            let _ = handle.await;
        }

        tracing::info!("Kith engine shutdown complete");
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
            tracing::debug!("Background sweeper stopped on drop");
        }
    }
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of Kith Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// TESTS
// ============================================================================
