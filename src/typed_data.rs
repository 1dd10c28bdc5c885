//! Shared EIP-712 schema
//!
//! The authorizer signs and the ledger verifies the exact same encoding, so the
//! struct layout and domain live here and nowhere else.

use std::borrow::Cow;

use alloy::primitives::{Address, Signature, B256, U256};
use alloy::sol_types::{Eip712Domain, SolStruct};
use serde::{Deserialize, Serialize};

pub const DOMAIN_NAME: &str = "GmManager";
pub const DOMAIN_VERSION: &str = "1";

pub mod abi {
    alloy::sol! {
        #[derive(Debug, PartialEq, Eq)]
        struct ScoreClaim {
            address wallet;
            uint256 score;
            uint256 validUntil;
            uint64 day;
        }

        #[derive(Debug, PartialEq, Eq)]
        event GmClaimed(
            address indexed user,
            uint256 score,
            uint8 scoreMultiplier,
            uint64 streakMultiplier,
            uint64 day,
            uint256 pointsAdded,
            uint256 newTotal
        );
    }
}

/// Signed attestation that `wallet` scored `score` on epoch `day`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreClaim {
    pub wallet: Address,
    pub score: u64,
    pub valid_until: u64,
    pub day: u64,
}

impl ScoreClaim {
    pub fn to_abi(&self) -> abi::ScoreClaim {
        abi::ScoreClaim {
            wallet: self.wallet,
            score: U256::from(self.score),
            validUntil: U256::from(self.valid_until),
            day: self.day,
        }
    }
}

/// Deployment a signature is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimDomain {
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl ClaimDomain {
    pub fn new(chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            chain_id,
            verifying_contract,
        }
    }

    pub fn eip712(&self) -> Eip712Domain {
        Eip712Domain::new(
            Some(Cow::Borrowed(DOMAIN_NAME)),
            Some(Cow::Borrowed(DOMAIN_VERSION)),
            Some(U256::from(self.chain_id)),
            Some(self.verifying_contract),
            None,
        )
    }

    pub fn signing_hash(&self, claim: &ScoreClaim) -> B256 {
        claim.to_abi().eip712_signing_hash(&self.eip712())
    }

    /// Address that produced `signature` over `claim`, if recoverable.
    pub fn recover_signer(&self, claim: &ScoreClaim, signature: &Signature) -> Option<Address> {
        signature
            .recover_address_from_prehash(&self.signing_hash(claim))
            .ok()
    }
}

/// 0x-prefixed lowercase hex, the key format used in storage and on the wire.
pub fn wallet_key(wallet: &Address) -> String {
    format!("0x{}", hex::encode(wallet.as_slice()))
}

pub fn parse_wallet(s: &str) -> Option<Address> {
    s.trim().parse::<Address>().ok()
}

pub fn encode_signature(signature: &Signature) -> String {
    format!("0x{}", hex::encode(signature.as_bytes()))
}

pub fn parse_signature(s: &str) -> Option<Signature> {
    let raw = s.trim();
    let bytes = hex::decode(raw.strip_prefix("0x").unwrap_or(raw)).ok()?;
    if bytes.len() != 65 {
        return None;
    }
    Signature::try_from(bytes.as_slice()).ok()
}
