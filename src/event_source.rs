//! Event sources the indexer reconciles from
//!
//! - `LocalEventLog`: the embedded ledger's own claim log
//! - `RpcEventSource`: `GmClaimed` logs of an on-chain deployment over JSON-RPC

use std::sync::Arc;

use alloy::primitives::{Address, B256};
use alloy::providers::Provider;
use alloy::rpc::types::{BlockNumberOrTag, Filter, Log};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use tracing::debug;

use crate::error::IndexerError;
use crate::storage::GmStorage;
use crate::typed_data::abi::GmClaimed;
use crate::types::{ClaimFinalizedRecord, PositionedRecord};

/// Chunk size for log queries to stay under provider range limits
pub const LOG_QUERY_CHUNK_SIZE: u64 = 5000;

/// Which logs to fetch: emitter address, event topic and inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Address,
    pub event_signature: B256,
    pub from: u64,
    pub to: u64,
}

impl LogQuery {
    pub fn claims(address: Address, from: u64, to: u64) -> Self {
        Self {
            address,
            event_signature: GmClaimed::SIGNATURE_HASH,
            from,
            to,
        }
    }
}

/// Append-only, immutable-once-included log of claim records.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Current head position (block height analogue).
    async fn head_position(&self) -> Result<u64, IndexerError>;

    /// Records in `[query.from, query.to]`, ordered by position.
    async fn logs_in_range(&self, query: &LogQuery) -> Result<Vec<PositionedRecord>, IndexerError>;

    /// Position to start from when no checkpoint exists.
    fn origin(&self) -> u64 {
        0
    }

    /// Whether `LogQuery::address` selects which logs come back. Such a
    /// source returns nothing for an unset address.
    fn filters_by_address(&self) -> bool {
        true
    }
}

/// Claim log written by the embedded ledger. A single ledger writes it, so
/// the query address is not filtered on.
pub struct LocalEventLog {
    storage: Arc<GmStorage>,
}

impl LocalEventLog {
    pub fn new(storage: Arc<GmStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl EventSource for LocalEventLog {
    async fn head_position(&self) -> Result<u64, IndexerError> {
        Ok(self.storage.claim_log_head()?)
    }

    async fn logs_in_range(&self, query: &LogQuery) -> Result<Vec<PositionedRecord>, IndexerError> {
        if query.event_signature != GmClaimed::SIGNATURE_HASH || query.from > query.to {
            return Ok(Vec::new());
        }
        Ok(self.storage.claim_log_range(query.from, query.to)?)
    }

    fn origin(&self) -> u64 {
        1
    }

    fn filters_by_address(&self) -> bool {
        false
    }
}

/// `GmClaimed` logs read from a JSON-RPC node.
pub struct RpcEventSource<P> {
    provider: P,
    from_block: u64,
}

impl<P: Provider> RpcEventSource<P> {
    pub fn new(provider: P, from_block: u64) -> Self {
        Self {
            provider,
            from_block,
        }
    }
}

#[async_trait]
impl<P: Provider + Send + Sync + 'static> EventSource for RpcEventSource<P> {
    async fn head_position(&self) -> Result<u64, IndexerError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| IndexerError::EventSource(e.to_string()))
    }

    async fn logs_in_range(&self, query: &LogQuery) -> Result<Vec<PositionedRecord>, IndexerError> {
        let filter = Filter::new()
            .address(query.address)
            .event_signature(query.event_signature);

        let mut records = Vec::new();
        for (from, to) in chunk_ranges(query.from, query.to, LOG_QUERY_CHUNK_SIZE) {
            let chunk_filter = filter
                .clone()
                .from_block(BlockNumberOrTag::Number(from))
                .to_block(BlockNumberOrTag::Number(to));

            let logs = self
                .provider
                .get_logs(&chunk_filter)
                .await
                .map_err(|e| IndexerError::EventSource(e.to_string()))?;
            debug!("Fetched {} claim logs in blocks {}..={}", logs.len(), from, to);

            for log in &logs {
                records.push(decode_claim_log(log, from)?);
            }
        }

        Ok(records)
    }

    fn origin(&self) -> u64 {
        self.from_block
    }
}

/// Split `[from, to]` into inclusive ranges of at most `size` blocks.
pub fn chunk_ranges(from: u64, to: u64, size: u64) -> Vec<(u64, u64)> {
    let size = size.max(1);
    let mut ranges = Vec::new();
    let mut current_from = from;

    while current_from <= to {
        let current_to = current_from.saturating_add(size - 1).min(to);
        ranges.push((current_from, current_to));
        if current_to == u64::MAX {
            break;
        }
        current_from = current_to + 1;
    }

    ranges
}

/// Decode one `GmClaimed` log. `chunk_from` labels errors for logs that
/// carry no block number.
fn decode_claim_log(log: &Log, chunk_from: u64) -> Result<PositionedRecord, IndexerError> {
    let position = log.block_number.ok_or_else(|| IndexerError::InvalidLog {
        position: chunk_from,
        detail: "log without block number (pending?)".to_string(),
    })?;
    let decoded = log
        .log_decode::<GmClaimed>()
        .map_err(|e| IndexerError::InvalidLog {
            position,
            detail: e.to_string(),
        })?;
    let record = ClaimFinalizedRecord::from_event(&decoded.inner.data)
        .map_err(|detail| IndexerError::InvalidLog { position, detail })?;
    Ok(PositionedRecord { position, record })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WalletLedgerRecord;
    use alloy::primitives::{Bytes, LogData, U256, U64};
    use alloy::providers::ProviderBuilder;
    use alloy::transports::mock::Asserter;

    const LEDGER: Address = Address::new([0xc0; 20]);

    fn claim_log(block: Option<u64>, user: Address, new_total: u64) -> Log {
        let event = GmClaimed {
            user,
            score: U256::from(16_000u64),
            scoreMultiplier: 3,
            streakMultiplier: 1,
            day: 19_675,
            pointsAdded: U256::from(3u64),
            newTotal: U256::from(new_total),
        };
        Log {
            inner: alloy::primitives::Log {
                address: LEDGER,
                data: event.encode_log_data(),
            },
            block_number: block,
            ..Default::default()
        }
    }

    #[test]
    fn test_chunk_ranges() {
        assert_eq!(
            chunk_ranges(1, 12_000, 5_000),
            vec![(1, 5_000), (5_001, 10_000), (10_001, 12_000)]
        );
        assert_eq!(chunk_ranges(7, 7, 5_000), vec![(7, 7)]);
        assert!(chunk_ranges(8, 7, 5_000).is_empty());
        // Ends exactly on u64::MAX without wrapping
        assert_eq!(
            chunk_ranges(u64::MAX - 2, u64::MAX, 2),
            vec![(u64::MAX - 2, u64::MAX - 1), (u64::MAX, u64::MAX)]
        );
    }

    #[test]
    fn test_decode_claim_log() {
        let wallet = Address::repeat_byte(0xaa);
        let decoded = decode_claim_log(&claim_log(Some(50), wallet, 9), 1).unwrap();
        assert_eq!(decoded.position, 50);
        assert_eq!(decoded.record.wallet, wallet);
        assert_eq!(decoded.record.score, 16_000);
        assert_eq!(decoded.record.score_multiplier, 3);
        assert_eq!(decoded.record.points_added, 3);
        assert_eq!(decoded.record.new_total, 9);
    }

    #[test]
    fn test_pending_log_is_invalid() {
        let err = decode_claim_log(&claim_log(None, Address::repeat_byte(0xaa), 3), 4_000)
            .unwrap_err();
        assert!(matches!(err, IndexerError::InvalidLog { position: 4_000, .. }));
        assert_eq!(err.code(), "INVALID_LOG");
    }

    #[test]
    fn test_foreign_event_is_invalid() {
        let mut log = claim_log(Some(60), Address::repeat_byte(0xaa), 3);
        log.inner.data = LogData::new_unchecked(vec![B256::repeat_byte(9)], Bytes::new());
        let err = decode_claim_log(&log, 1).unwrap_err();
        assert!(matches!(err, IndexerError::InvalidLog { position: 60, .. }));
    }

    #[tokio::test]
    async fn test_rpc_source_reads_every_chunk() {
        let asserter = Asserter::new();
        let provider = ProviderBuilder::new().connect_mocked_client(asserter.clone());
        let source = RpcEventSource::new(provider, 1);
        assert_eq!(source.origin(), 1);

        let head = LOG_QUERY_CHUNK_SIZE + 10;
        asserter.push_success(&U64::from(head));
        assert_eq!(source.head_position().await.unwrap(), head);

        // One eth_getLogs answer per chunk, in order
        let wallet = Address::repeat_byte(0xaa);
        asserter.push_success(&vec![claim_log(Some(50), wallet, 3)]);
        asserter.push_success(&vec![claim_log(Some(LOG_QUERY_CHUNK_SIZE + 5), wallet, 9)]);

        let records = source
            .logs_in_range(&LogQuery::claims(LEDGER, 1, head))
            .await
            .unwrap();
        let positions: Vec<u64> = records.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![50, LOG_QUERY_CHUNK_SIZE + 5]);
        assert_eq!(records[1].record.new_total, 9);
    }

    #[tokio::test]
    async fn test_rpc_source_rejects_pending_log() {
        let asserter = Asserter::new();
        let provider = ProviderBuilder::new().connect_mocked_client(asserter.clone());
        let source = RpcEventSource::new(provider, 1);

        asserter.push_success(&vec![claim_log(None, Address::repeat_byte(0xaa), 3)]);
        let err = source
            .logs_in_range(&LogQuery::claims(LEDGER, 10, 20))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::InvalidLog { position: 10, .. }));
    }

    fn commit(storage: &GmStorage, wallet: Address, day: u64, total: u64) {
        let record = WalletLedgerRecord {
            wallet,
            total_points: total,
            last_claim_day: Some(day),
            current_streak: 1,
        };
        let event = ClaimFinalizedRecord {
            wallet,
            score: 10,
            score_multiplier: 1,
            streak_multiplier: 1,
            day,
            points_added: 1,
            new_total: total,
        };
        let prev = storage.wallet_record(&wallet).unwrap().and_then(|r| r.last_claim_day);
        storage.commit_claim(prev, &record, &event).unwrap();
    }

    #[tokio::test]
    async fn test_local_log_head_and_range() {
        let storage = Arc::new(GmStorage::in_memory().unwrap());
        let source = LocalEventLog::new(storage.clone());
        assert_eq!(source.head_position().await.unwrap(), 0);

        commit(&storage, Address::repeat_byte(1), 10, 1);
        commit(&storage, Address::repeat_byte(2), 10, 1);
        commit(&storage, Address::repeat_byte(1), 11, 2);
        assert_eq!(source.head_position().await.unwrap(), 3);

        let all = source
            .logs_in_range(&LogQuery::claims(Address::ZERO, source.origin(), 3))
            .await
            .unwrap();
        let positions: Vec<u64> = all.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);

        let tail = source
            .logs_in_range(&LogQuery::claims(Address::ZERO, 3, 3))
            .await
            .unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].record.new_total, 2);
    }

    #[tokio::test]
    async fn test_local_log_ignores_other_topics() {
        let storage = Arc::new(GmStorage::in_memory().unwrap());
        commit(&storage, Address::repeat_byte(1), 10, 1);
        let source = LocalEventLog::new(storage);

        let query = LogQuery {
            event_signature: B256::repeat_byte(9),
            ..LogQuery::claims(Address::ZERO, 1, 1)
        };
        assert!(source.logs_in_range(&query).await.unwrap().is_empty());
    }
}
