//! Durable storage for wallet records, the claim log, the leaderboard and the
//! indexer checkpoint.

use std::path::Path;
use std::sync::Arc;

use alloy::primitives::Address;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::error::StorageError;
use crate::typed_data::{parse_wallet, wallet_key};
use crate::types::{ClaimFinalizedRecord, LeaderboardEntry, PositionedRecord, WalletLedgerRecord};

const SCHEMA: &str = include_str!("../migrations/001_schema.sql");
const CHECKPOINT_KEY: &str = "checkpoint";

pub struct GmStorage {
    conn: Mutex<Connection>,
}

impl GmStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.run_migrations()?;
        info!("Opened SQLite storage at {}", path.as_ref().display());
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    /// Run `op` against this store on tokio's blocking pool. SQLite calls
    /// (and their fsyncs) never execute on an async worker this way.
    pub async fn blocking<T, F>(self: &Arc<Self>, op: F) -> Result<T, StorageError>
    where
        F: FnOnce(&GmStorage) -> Result<T, StorageError> + Send + 'static,
        T: Send + 'static,
    {
        let storage = Arc::clone(self);
        tokio::task::spawn_blocking(move || op(&storage))
            .await
            .map_err(|e| StorageError::Blocking(e.to_string()))?
    }

    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ========================================================================
    // WALLET RECORDS
    // ========================================================================

    pub fn wallet_record(
        &self,
        wallet: &Address,
    ) -> Result<Option<WalletLedgerRecord>, StorageError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT total_points, last_claim_day, current_streak
                 FROM wallet_records WHERE wallet = ?1",
                params![wallet_key(wallet)],
                |row| {
                    Ok((
                        row.get::<_, u64>(0)?,
                        row.get::<_, Option<u64>>(1)?,
                        row.get::<_, u64>(2)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(
            |(total_points, last_claim_day, current_streak)| WalletLedgerRecord {
                wallet: *wallet,
                total_points,
                last_claim_day,
                current_streak,
            },
        ))
    }

    /// Write the advanced wallet record and append its claim event in one
    /// transaction. The update only applies if the stored `last_claim_day`
    /// still equals `expected_last_day`. Returns the event's log position.
    pub fn commit_claim(
        &self,
        expected_last_day: Option<u64>,
        record: &WalletLedgerRecord,
        event: &ClaimFinalizedRecord,
    ) -> Result<u64, StorageError> {
        let key = wallet_key(&record.wallet);
        let now = Utc::now().to_rfc3339();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "INSERT INTO wallet_records (wallet, total_points, last_claim_day, current_streak, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (wallet) DO UPDATE SET
                total_points = excluded.total_points,
                last_claim_day = excluded.last_claim_day,
                current_streak = excluded.current_streak,
                updated_at = excluded.updated_at
             WHERE wallet_records.last_claim_day IS ?6",
            params![
                key,
                record.total_points,
                record.last_claim_day,
                record.current_streak,
                now,
                expected_last_day,
            ],
        )?;
        if changed != 1 {
            return Err(StorageError::Conflict(key));
        }

        tx.execute(
            "INSERT INTO claim_events
                (wallet, score, score_multiplier, streak_multiplier, day, points_added, new_total, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                key,
                event.score,
                event.score_multiplier,
                event.streak_multiplier,
                event.day,
                event.points_added,
                event.new_total,
                now,
            ],
        )?;
        let position = tx.last_insert_rowid() as u64;

        tx.commit()?;
        Ok(position)
    }

    // ========================================================================
    // CLAIM LOG
    // ========================================================================

    /// Highest claim log position, 0 when empty.
    pub fn claim_log_head(&self) -> Result<u64, StorageError> {
        let conn = self.conn.lock();
        let head: u64 = conn.query_row(
            "SELECT COALESCE(MAX(position), 0) FROM claim_events",
            [],
            |row| row.get(0),
        )?;
        Ok(head)
    }

    /// Claim events with `from <= position <= to`, in log order.
    pub fn claim_log_range(&self, from: u64, to: u64) -> Result<Vec<PositionedRecord>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT position, wallet, score, score_multiplier, streak_multiplier, day, points_added, new_total
             FROM claim_events WHERE position >= ?1 AND position <= ?2 ORDER BY position ASC",
        )?;

        let rows = stmt
            .query_map(params![from, to], |row| {
                Ok((row.get::<_, u64>(0)?, row.get::<_, String>(1)?, record_fields(row)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(position, wallet, fields)| {
                let wallet = decode_wallet("claim_events", &wallet)?;
                Ok(PositionedRecord {
                    position,
                    record: fields.with_wallet(wallet),
                })
            })
            .collect()
    }

    pub fn wallet_history(&self, wallet: &Address) -> Result<Vec<PositionedRecord>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT position, wallet, score, score_multiplier, streak_multiplier, day, points_added, new_total
             FROM claim_events WHERE wallet = ?1 ORDER BY position ASC",
        )?;

        let history = stmt
            .query_map(params![wallet_key(wallet)], |row| {
                Ok(PositionedRecord {
                    position: row.get(0)?,
                    record: record_fields(row)?.with_wallet(*wallet),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(history)
    }

    // ========================================================================
    // LEADERBOARD
    // ========================================================================

    /// Last-write-wins overwrite of a wallet's points.
    pub fn upsert_leader(&self, wallet: &Address, points: u64) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        upsert_leader_row(&conn, wallet, points, &Utc::now().to_rfc3339())?;
        Ok(())
    }

    /// Highest `n` entries, points descending, ties in first-insertion order.
    pub fn top_leaders(&self, n: usize) -> Result<Vec<LeaderboardEntry>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT wallet, points FROM leaderboard ORDER BY points DESC, rowid ASC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![n as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(wallet, points)| {
                Ok(LeaderboardEntry {
                    wallet: decode_wallet("leaderboard", &wallet)?,
                    points,
                })
            })
            .collect()
    }

    pub fn leader_points(&self, wallet: &Address) -> Result<Option<u64>, StorageError> {
        let conn = self.conn.lock();
        let points = conn
            .query_row(
                "SELECT points FROM leaderboard WHERE wallet = ?1",
                params![wallet_key(wallet)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(points)
    }

    // ========================================================================
    // CHECKPOINT
    // ========================================================================

    pub fn checkpoint(&self) -> Result<Option<u64>, StorageError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM indexer_state WHERE key = ?1",
                params![CHECKPOINT_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Apply a batch of leaderboard upserts and advance the checkpoint in a
    /// single transaction. The checkpoint never moves backwards.
    pub fn commit_batch(
        &self,
        entries: &[LeaderboardEntry],
        checkpoint: u64,
    ) -> Result<(), StorageError> {
        let now = Utc::now().to_rfc3339();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        for entry in entries {
            upsert_leader_row(&tx, &entry.wallet, entry.points, &now)?;
        }

        tx.execute(
            "INSERT INTO indexer_state (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
             WHERE excluded.value > indexer_state.value",
            params![CHECKPOINT_KEY, checkpoint, now],
        )?;

        tx.commit()?;
        Ok(())
    }
}

fn upsert_leader_row(
    conn: &Connection,
    wallet: &Address,
    points: u64,
    now: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO leaderboard (wallet, points, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (wallet) DO UPDATE SET points = excluded.points, updated_at = excluded.updated_at",
        params![wallet_key(wallet), points, now],
    )?;
    Ok(())
}

fn decode_wallet(table: &'static str, raw: &str) -> Result<Address, StorageError> {
    parse_wallet(raw).ok_or_else(|| StorageError::Corrupt {
        table,
        detail: format!("bad wallet {:?}", raw),
    })
}

/// Claim event columns 2..=7, wallet filled in by the caller.
struct RecordFields {
    score: u64,
    score_multiplier: u8,
    streak_multiplier: u64,
    day: u64,
    points_added: u64,
    new_total: u64,
}

impl RecordFields {
    fn with_wallet(self, wallet: Address) -> ClaimFinalizedRecord {
        ClaimFinalizedRecord {
            wallet,
            score: self.score,
            score_multiplier: self.score_multiplier,
            streak_multiplier: self.streak_multiplier,
            day: self.day,
            points_added: self.points_added,
            new_total: self.new_total,
        }
    }
}

fn record_fields(row: &Row<'_>) -> rusqlite::Result<RecordFields> {
    Ok(RecordFields {
        score: row.get(2)?,
        score_multiplier: row.get(3)?,
        streak_multiplier: row.get(4)?,
        day: row.get(5)?,
        points_added: row.get(6)?,
        new_total: row.get(7)?,
    })
}
