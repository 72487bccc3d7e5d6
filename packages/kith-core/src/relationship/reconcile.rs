//! # Reconciler
//!
//! Detects and repairs pairs whose two halves disagree.
//!
//! ## Repair Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           REPAIR FLOW                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   read both halves ──► divergences() ──► empty? ──► done               │
//! │          ▲                                  │                           │
//! │          │                                  ▼ no                        │
//! │          │                            repair_plan()                     │
//! │          │                                  │                           │
//! │          └──────── apply writes in order ◄──┘                           │
//! │                                                                         │
//! │   Divergence                    Repair                                  │
//! │   ─────────────────────────     ─────────────────────────────────       │
//! │   BlockViolation                run the block cascade                   │
//! │   ReciprocalPending             clear requests, write friendship        │
//! │   HalfFriendship                add the missing friends record          │
//! │   PendingAlongsideFriendship    clear requests                          │
//! │   UnmirroredRequest             add the received record                 │
//! │   OrphanedReceipt               delete the received record              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Repairs are built from the same write plans the operations use, so the
//! reconciler never moves a pair anywhere an operation could not. Every
//! repair write is idempotent; running the reconciler concurrently with
//! itself or with operations is safe.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::plan;
use super::state::{Divergence, PairSnapshot, PairState};
use crate::error::Result;
use crate::identity::UserId;
use crate::storage::{apply_all, EdgeWrite, Relation, SharedStore};

/// Upper bound on detect/repair rounds for one pair
///
/// A concurrent operation can introduce a fresh divergence between rounds;
/// the bound keeps a hot pair from pinning the reconciler.
const MAX_REPAIR_PASSES: usize = 3;

/// Default number of pairs reconciled concurrently by a sweep
pub const DEFAULT_SWEEP_CONCURRENCY: usize = 8;

/// Writes that repair the given divergences of the pair `(a, b)`
pub fn repair_plan(a: &UserId, b: &UserId, divergences: &[Divergence]) -> Vec<EdgeWrite> {
    let mut writes = Vec::new();

    for divergence in divergences {
        match divergence {
            Divergence::BlockViolation => writes.extend(plan::block_cascade(a, b)),
            Divergence::ReciprocalPending => writes.extend(plan::collapse_reciprocal(a, b)),
            Divergence::HalfFriendship { holder, missing } => {
                writes.push(EdgeWrite::set(missing, Relation::Friends, holder));
            }
            Divergence::PendingAlongsideFriendship => {
                writes.extend(plan::withdraw_all_requests(a, b));
            }
            Divergence::UnmirroredRequest { sender, recipient } => {
                writes.push(EdgeWrite::set(recipient, Relation::RequestsReceived, sender));
            }
            Divergence::OrphanedReceipt { sender, recipient } => {
                writes.push(EdgeWrite::clear(recipient, Relation::RequestsReceived, sender));
            }
        }
    }

    writes
}

/// Result of reconciling one pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Everything detected, across all rounds
    pub divergences: Vec<Divergence>,
    /// Repair writes applied, in order
    pub writes: Vec<EdgeWrite>,
    /// The pair as read after the last round
    pub snapshot: PairSnapshot,
}

impl ReconcileReport {
    /// Did this reconciliation write anything?
    pub fn repaired(&self) -> bool {
        !self.writes.is_empty()
    }

    /// State of the pair after reconciliation
    pub fn state(&self) -> PairState {
        self.snapshot.state()
    }
}

/// Result of a full sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Users whose records were enumerated
    pub users_scanned: usize,
    /// Distinct unordered pairs examined
    pub pairs_checked: usize,
    /// Pairs that needed at least one repair write
    pub pairs_repaired: usize,
    /// Total repair writes applied
    pub writes_applied: usize,
    /// Users or pairs that could not be processed
    pub failures: usize,
    /// Wall-clock duration of the sweep
    pub elapsed_ms: i64,
}

/// Pair repair, read-repair and background sweeps
pub struct Reconciler {
    store: SharedStore,
    repair_on_read: bool,
    sweep_concurrency: usize,
}

impl Reconciler {
    /// Create a reconciler with read-repair enabled
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            repair_on_read: true,
            sweep_concurrency: DEFAULT_SWEEP_CONCURRENCY,
        }
    }

    /// Enable or disable repairing pairs as they are read
    pub fn with_repair_on_read(mut self, enabled: bool) -> Self {
        self.repair_on_read = enabled;
        self
    }

    /// Set how many pairs a sweep reconciles at once
    pub fn with_sweep_concurrency(mut self, concurrency: usize) -> Self {
        self.sweep_concurrency = concurrency.max(1);
        self
    }

    /// Is read-repair enabled?
    pub fn repairs_on_read(&self) -> bool {
        self.repair_on_read
    }

    /// Read the pair without repairing it
    pub async fn snapshot(&self, a: &UserId, b: &UserId) -> Result<PairSnapshot> {
        PairSnapshot::read(&*self.store, a, b).await
    }

    /// Read the pair, repairing it first when read-repair is enabled
    pub async fn observe(&self, a: &UserId, b: &UserId) -> Result<PairSnapshot> {
        if self.repair_on_read {
            Ok(self.reconcile_pair(a, b).await?.snapshot)
        } else {
            self.snapshot(a, b).await
        }
    }

    /// Detect and repair divergences of one pair
    pub async fn reconcile_pair(&self, a: &UserId, b: &UserId) -> Result<ReconcileReport> {
        let mut snapshot = self.snapshot(a, b).await?;
        let mut divergences = Vec::new();
        let mut writes = Vec::new();

        for _ in 0..MAX_REPAIR_PASSES {
            let found = snapshot.divergences();
            if found.is_empty() {
                break;
            }

            let repairs = repair_plan(a, b, &found);
            tracing::info!(
                a = %a,
                b = %b,
                divergences = ?found,
                writes = repairs.len(),
                "Repairing divergent pair"
            );

            apply_all(&*self.store, &repairs).await?;
            divergences.extend(found);
            writes.extend(repairs);
            snapshot = self.snapshot(a, b).await?;
        }

        if !snapshot.is_consistent() {
            tracing::warn!(a = %a, b = %b, "Pair still divergent after repair, leaving for next sweep");
        }

        Ok(ReconcileReport {
            divergences,
            writes,
            snapshot,
        })
    }

    /// Every unordered pair with at least one record, as seen from the
    /// directory's users
    async fn collect_pairs(&self, report: &mut SweepReport) -> Result<BTreeSet<(UserId, UserId)>> {
        let users = self.store.users().await?;
        let mut pairs = BTreeSet::new();

        for user in &users {
            let mut counterparts = BTreeSet::new();
            let mut failed = false;

            for relation in Relation::ALL {
                match self.store.read_all(user, relation).await {
                    Ok(others) => counterparts.extend(others),
                    Err(e) => {
                        tracing::warn!(user = %user, relation = %relation, "Sweep could not enumerate: {}", e);
                        failed = true;
                    }
                }
            }

            if failed {
                report.failures += 1;
            }
            report.users_scanned += 1;

            for other in counterparts {
                let pair = if *user < other {
                    (user.clone(), other)
                } else {
                    (other, user.clone())
                };
                pairs.insert(pair);
            }
        }

        Ok(pairs)
    }

    /// Reconcile every pair reachable from the user directory
    ///
    /// Per-pair failures are counted and logged; the sweep continues.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let started = crate::time::now_timestamp_millis();
        let mut report = SweepReport::default();

        let pairs = self.collect_pairs(&mut report).await?;
        report.pairs_checked = pairs.len();

        let outcomes: Vec<_> = stream::iter(pairs)
            .map(|(a, b)| async move {
                let outcome = self.reconcile_pair(&a, &b).await;
                (a, b, outcome)
            })
            .buffer_unordered(self.sweep_concurrency)
            .collect()
            .await;

        for (a, b, outcome) in outcomes {
            match outcome {
                Ok(pair) if pair.repaired() => {
                    report.pairs_repaired += 1;
                    report.writes_applied += pair.writes.len();
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(a = %a, b = %b, "Sweep failed to reconcile pair: {}", e);
                    report.failures += 1;
                }
            }
        }

        report.elapsed_ms = crate::time::now_timestamp_millis() - started;
        Ok(report)
    }

    /// Run [`sweep`](Self::sweep) every `every`, until the task is aborted
    ///
    /// `every` must be non-zero.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let reconciler = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                match reconciler.sweep().await {
                    Ok(report) if report.pairs_repaired > 0 || report.failures > 0 => {
                        tracing::info!(
                            pairs = report.pairs_checked,
                            repaired = report.pairs_repaired,
                            writes = report.writes_applied,
                            failures = report.failures,
                            "Sweep finished"
                        );
                    }
                    Ok(report) => {
                        tracing::debug!(pairs = report.pairs_checked, "Sweep found nothing to repair");
                    }
                    Err(e) => tracing::warn!("Sweep aborted: {}", e),
                }
            }
        })
    }
}
