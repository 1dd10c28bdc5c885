//! Leaderboard reconciliation
//!
//! Catches the leaderboard up with the claim log from a durable checkpoint.
//! Each claim record carries the wallet's cumulative total, so applying a
//! record is an absolute overwrite and replaying a range is harmless.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::interval;
use tracing::{debug, error, info};

use crate::error::{IndexerError, StorageError};
use crate::event_source::{EventSource, LogQuery};
use crate::leaderboard::IndexStore;
use crate::types::LeaderboardEntry;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub processed_count: usize,
    pub checkpoint_after: Option<u64>,
    /// True when this trigger was folded into a reconciliation that was
    /// already running.
    pub coalesced: bool,
}

pub struct ChainIndexer {
    source: Arc<dyn EventSource>,
    store: Arc<dyn IndexStore>,
    ledger_address: Address,
    request_timeout: Duration,
    in_flight: AsyncMutex<Option<ReconcileReport>>,
    completed: AtomicU64,
}

impl ChainIndexer {
    pub fn new(
        source: Arc<dyn EventSource>,
        store: Arc<dyn IndexStore>,
        ledger_address: Address,
    ) -> Self {
        Self {
            source,
            store,
            ledger_address,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            in_flight: AsyncMutex::new(None),
            completed: AtomicU64::new(0),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Run one reconciliation, or join the one already in progress.
    pub async fn reconcile(&self) -> Result<ReconcileReport, IndexerError> {
        let seen = self.completed.load(Ordering::Acquire);
        let mut last = self.in_flight.lock().await;

        if self.completed.load(Ordering::Acquire) != seen {
            if let Some(report) = *last {
                debug!("Reconcile trigger coalesced into finished run");
                return Ok(ReconcileReport {
                    coalesced: true,
                    ..report
                });
            }
        }

        let report = self.reconcile_batch().await?;
        *last = Some(report);
        self.completed.fetch_add(1, Ordering::AcqRel);
        Ok(report)
    }

    async fn reconcile_batch(&self) -> Result<ReconcileReport, IndexerError> {
        if self.ledger_address == Address::ZERO && self.source.filters_by_address() {
            return Err(IndexerError::Unconfigured("NO_CONTRACT"));
        }

        let checkpoint = self.on_store(|store| store.checkpoint()).await?;
        let from = match checkpoint {
            Some(position) => position.saturating_add(1),
            None => self.source.origin(),
        };

        let head = self
            .bounded("head query", self.source.head_position())
            .await?;

        if head < from {
            debug!(
                "Nothing to index (head {}, checkpoint {:?})",
                head, checkpoint
            );
            return Ok(ReconcileReport {
                processed_count: 0,
                checkpoint_after: checkpoint,
                coalesced: false,
            });
        }

        let query = LogQuery::claims(self.ledger_address, from, head);
        let mut records = self
            .bounded("log query", self.source.logs_in_range(&query))
            .await?;
        records.retain(|r| r.position >= from && r.position <= head);
        // Stable: logs sharing a position keep source order
        records.sort_by_key(|r| r.position);

        let entries: Vec<LeaderboardEntry> = records
            .iter()
            .map(|r| LeaderboardEntry {
                wallet: r.record.wallet,
                points: r.record.new_total,
            })
            .collect();

        let processed_count = entries.len();
        self.on_store(move |store| store.commit_batch(&entries, head))
            .await?;

        if processed_count > 0 {
            info!(
                "Indexed {} claim records in positions {}..={}",
                processed_count, from, head
            );
        }

        Ok(ReconcileReport {
            processed_count,
            checkpoint_after: Some(head),
            coalesced: false,
        })
    }

    async fn on_store<T, F>(&self, op: F) -> Result<T, IndexerError>
    where
        F: FnOnce(&dyn IndexStore) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| StorageError::Blocking(e.to_string()))?
            .map_err(IndexerError::from)
    }

    async fn bounded<T>(
        &self,
        what: &'static str,
        call: impl Future<Output = Result<T, IndexerError>>,
    ) -> Result<T, IndexerError> {
        tokio::time::timeout(self.request_timeout, call)
            .await
            .map_err(|_| IndexerError::Timeout(what))?
    }

    /// Reconcile on a fixed interval until the task is dropped.
    pub async fn run_loop(self: Arc<Self>, every: Duration) {
        info!("Starting leaderboard indexer (every {:?})", every);
        let mut ticker = interval(every);

        loop {
            ticker.tick().await;

            if let Err(e) = self.reconcile().await {
                error!("Leaderboard reconcile failed ({}): {}", e.code(), e);
            }
        }
    }
}
