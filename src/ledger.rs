//! Claim ledger
//!
//! Consumes authorizer-signed score claims at most once per wallet per day and
//! turns them into streak- and score-weighted points. Every accepted claim is
//! appended to the claim log in the same transaction that advances the wallet
//! record.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, Signature};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::error::{ClaimError, StorageError};
use crate::scoring::{next_streak, now_unix, ScoreTiers};
use crate::storage::GmStorage;
use crate::typed_data::{wallet_key, ClaimDomain, ScoreClaim};
use crate::types::{ClaimFinalizedRecord, WalletLedgerRecord};

/// Idle per-wallet locks are dropped once the table grows past this.
const LOCK_TABLE_PRUNE_AT: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimReceipt {
    pub points_added: u64,
    pub new_total: u64,
    pub position: u64,
    #[serde(skip)]
    pub record: ClaimFinalizedRecord,
}

/// One async mutex per wallet; different wallets never contend.
#[derive(Default)]
struct WalletLocks {
    table: parking_lot::Mutex<HashMap<Address, Arc<AsyncMutex<()>>>>,
}

impl WalletLocks {
    async fn acquire(&self, wallet: Address) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.table.lock();
            if table.len() >= LOCK_TABLE_PRUNE_AT {
                table.retain(|_, l| Arc::strong_count(l) > 1);
            }
            table.entry(wallet).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct ClaimLedger {
    storage: Arc<GmStorage>,
    domain: ClaimDomain,
    authorizer: Address,
    tiers: ScoreTiers,
    locks: WalletLocks,
}

impl ClaimLedger {
    pub fn new(
        storage: Arc<GmStorage>,
        domain: ClaimDomain,
        authorizer: Address,
        tiers: ScoreTiers,
    ) -> Self {
        info!(
            "Claim ledger at {} (chain {}) trusting authorizer {}",
            wallet_key(&domain.verifying_contract),
            domain.chain_id,
            wallet_key(&authorizer)
        );
        Self {
            storage,
            domain,
            authorizer,
            tiers,
            locks: WalletLocks::default(),
        }
    }

    pub fn domain(&self) -> &ClaimDomain {
        &self.domain
    }

    pub fn tiers(&self) -> &ScoreTiers {
        &self.tiers
    }

    /// Current record for `wallet`, or the unseen default.
    pub fn record(&self, wallet: &Address) -> Result<WalletLedgerRecord, ClaimError> {
        Ok(self
            .storage
            .wallet_record(wallet)?
            .unwrap_or_else(|| WalletLedgerRecord::unseen(*wallet)))
    }

    async fn load_record(&self, wallet: Address) -> Result<WalletLedgerRecord, ClaimError> {
        let stored = self.storage.blocking(move |s| s.wallet_record(&wallet)).await?;
        Ok(stored.unwrap_or_else(|| WalletLedgerRecord::unseen(wallet)))
    }

    /// Another writer advanced the wallet between our read and our commit.
    /// Report what that writer's record means for this claim.
    async fn lost_race(&self, claim: &ScoreClaim) -> ClaimError {
        let wallet = wallet_key(&claim.wallet);
        match self.load_record(claim.wallet).await {
            Ok(current) => {
                let err = day_conflict(&current, claim.day)
                    .unwrap_or_else(|| ClaimError::Storage(StorageError::Conflict(wallet.clone())));
                warn!("Claim for {} lost a concurrent commit: {}", wallet, err);
                err
            }
            Err(e) => e,
        }
    }

    pub async fn submit_claim(
        &self,
        caller: Address,
        claim: &ScoreClaim,
        signature: &Signature,
    ) -> Result<ClaimReceipt, ClaimError> {
        self.submit_claim_at(caller, claim, signature, now_unix())
            .await
    }

    pub async fn submit_claim_at(
        &self,
        caller: Address,
        claim: &ScoreClaim,
        signature: &Signature,
        now: u64,
    ) -> Result<ClaimReceipt, ClaimError> {
        let wallet = wallet_key(&claim.wallet);

        if self.domain.recover_signer(claim, signature) != Some(self.authorizer) {
            warn!("Rejected claim for {}: signature not from authorizer", wallet);
            return Err(ClaimError::InvalidSignature);
        }

        if now > claim.valid_until {
            debug!(
                "Rejected claim for {}: expired at {} (now {})",
                wallet, claim.valid_until, now
            );
            return Err(ClaimError::ClaimExpired {
                valid_until: claim.valid_until,
                now,
            });
        }

        if caller != claim.wallet {
            warn!(
                "Rejected claim for {}: submitted by {}",
                wallet,
                wallet_key(&caller)
            );
            return Err(ClaimError::WalletMismatch);
        }

        // Dropping the guard (including on caller timeout) releases the wallet
        let _guard = self.locks.acquire(claim.wallet).await;

        let record = self.load_record(claim.wallet).await?;
        if let Some(err) = day_conflict(&record, claim.day) {
            debug!("Rejected claim for {}: {}", wallet, err);
            return Err(err);
        }

        let streak_multiplier = next_streak(record.last_claim_day, record.current_streak, claim.day);
        let score_multiplier = self.tiers.multiplier_for(claim.score);
        let points_added = streak_multiplier
            .checked_mul(u64::from(score_multiplier))
            .ok_or(ClaimError::PointsOverflow)?;
        let new_total = record
            .total_points
            .checked_add(points_added)
            .ok_or(ClaimError::PointsOverflow)?;

        let updated = WalletLedgerRecord {
            wallet: claim.wallet,
            total_points: new_total,
            last_claim_day: Some(claim.day),
            current_streak: streak_multiplier,
        };
        let event = ClaimFinalizedRecord {
            wallet: claim.wallet,
            score: claim.score,
            score_multiplier,
            streak_multiplier,
            day: claim.day,
            points_added,
            new_total,
        };

        let expected_last_day = record.last_claim_day;
        let committed = self
            .storage
            .blocking(move |s| s.commit_claim(expected_last_day, &updated, &event))
            .await;
        let position = match committed {
            Ok(position) => position,
            Err(StorageError::Conflict(_)) => return Err(self.lost_race(claim).await),
            Err(e) => return Err(e.into()),
        };

        info!(
            "Claim accepted for {}: day {}, streak {}, x{} score, +{} points (total {})",
            wallet, claim.day, streak_multiplier, score_multiplier, points_added, new_total
        );

        Ok(ClaimReceipt {
            points_added,
            new_total,
            position,
            record: event,
        })
    }
}

/// Day-ordering rejection for a claim on `day` against the stored record.
fn day_conflict(record: &WalletLedgerRecord, day: u64) -> Option<ClaimError> {
    let last_day = record.last_claim_day?;
    if day == last_day {
        Some(ClaimError::TooManyClaimsToday { day })
    } else if day < last_day {
        Some(ClaimError::StaleClaimDay {
            day,
            last_claim_day: last_day,
        })
    } else {
        None
    }
}
