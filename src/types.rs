use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::typed_data::abi::GmClaimed;

/// Per-wallet ledger state. Owned by the claim ledger; never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletLedgerRecord {
    pub wallet: Address,
    pub total_points: u64,
    pub last_claim_day: Option<u64>,
    pub current_streak: u64,
}

impl WalletLedgerRecord {
    pub fn unseen(wallet: Address) -> Self {
        Self {
            wallet,
            total_points: 0,
            last_claim_day: None,
            current_streak: 0,
        }
    }
}

/// Write-once record emitted for every accepted claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimFinalizedRecord {
    pub wallet: Address,
    pub score: u64,
    pub score_multiplier: u8,
    pub streak_multiplier: u64,
    pub day: u64,
    pub points_added: u64,
    pub new_total: u64,
}

impl ClaimFinalizedRecord {
    pub fn from_event(event: &GmClaimed) -> Result<Self, String> {
        let narrow = |name: &str, v: alloy::primitives::U256| {
            u64::try_from(v).map_err(|_| format!("{} out of range: {}", name, v))
        };
        Ok(Self {
            wallet: event.user,
            score: narrow("score", event.score)?,
            score_multiplier: event.scoreMultiplier,
            streak_multiplier: event.streakMultiplier,
            day: event.day,
            points_added: narrow("pointsAdded", event.pointsAdded)?,
            new_total: narrow("newTotal", event.newTotal)?,
        })
    }
}

/// A claim record together with its event-source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionedRecord {
    pub position: u64,
    pub record: ClaimFinalizedRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub wallet: Address,
    pub points: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;

    fn event(new_total: U256) -> GmClaimed {
        GmClaimed {
            user: Address::repeat_byte(5),
            score: U256::from(16_000u64),
            scoreMultiplier: 3,
            streakMultiplier: 2,
            day: 19_676,
            pointsAdded: U256::from(6u64),
            newTotal: new_total,
        }
    }

    #[test]
    fn test_from_event() {
        let record = ClaimFinalizedRecord::from_event(&event(U256::from(9u64))).unwrap();
        assert_eq!(record.wallet, Address::repeat_byte(5));
        assert_eq!(record.points_added, 6);
        assert_eq!(record.new_total, 9);
        assert_eq!(record.score_multiplier, 3);
    }

    #[test]
    fn test_from_event_rejects_oversized_totals() {
        assert!(ClaimFinalizedRecord::from_event(&event(U256::MAX)).is_err());
    }
}
