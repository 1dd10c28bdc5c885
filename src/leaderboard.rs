//! Ranked leaderboard and the indexer's view of its backing store.

use alloy::primitives::Address;

use crate::error::StorageError;
use crate::storage::GmStorage;
use crate::types::LeaderboardEntry;

/// Largest page served by the public read.
pub const MAX_TOP_N: usize = 100;
pub const DEFAULT_TOP_N: usize = 20;

/// Durable wallet -> points map ordered by points descending.
pub trait LeaderboardStore: Send + Sync {
    /// Overwrite, never increment.
    fn upsert(&self, wallet: &Address, points: u64) -> Result<(), StorageError>;

    fn top_n(&self, n: usize) -> Result<Vec<LeaderboardEntry>, StorageError>;
}

/// What the indexer needs: the leaderboard plus a checkpoint that advances in
/// the same atomic unit as a batch of upserts.
pub trait IndexStore: LeaderboardStore {
    fn checkpoint(&self) -> Result<Option<u64>, StorageError>;

    fn commit_batch(
        &self,
        entries: &[LeaderboardEntry],
        checkpoint: u64,
    ) -> Result<(), StorageError>;
}

impl LeaderboardStore for GmStorage {
    fn upsert(&self, wallet: &Address, points: u64) -> Result<(), StorageError> {
        self.upsert_leader(wallet, points)
    }

    fn top_n(&self, n: usize) -> Result<Vec<LeaderboardEntry>, StorageError> {
        self.top_leaders(n)
    }
}

impl IndexStore for GmStorage {
    fn checkpoint(&self) -> Result<Option<u64>, StorageError> {
        GmStorage::checkpoint(self)
    }

    fn commit_batch(
        &self,
        entries: &[LeaderboardEntry],
        checkpoint: u64,
    ) -> Result<(), StorageError> {
        GmStorage::commit_batch(self, entries, checkpoint)
    }
}

/// Page size for a request: `DEFAULT_TOP_N` when absent, capped at
/// `MAX_TOP_N`. Zero stays zero.
pub fn clamp_top_n(requested: Option<usize>) -> usize {
    requested.unwrap_or(DEFAULT_TOP_N).min(MAX_TOP_N)
}
