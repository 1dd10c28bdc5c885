//! Score authorization
//!
//! - Anti-abuse floors on play sessions
//! - EIP-712 score attestations signed with the authorizer key
//! - EIP-191 caller proofs for claim submission

use alloy::primitives::{Address, Signature};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AuthorizeError;
use crate::scoring::{epoch_day, now_unix};
use crate::typed_data::{wallet_key, ClaimDomain, ScoreClaim};

pub const DEFAULT_MIN_MOVES: u32 = 10;
pub const DEFAULT_MIN_DURATION_MS: u64 = 15_000;
pub const DEFAULT_CLAIM_VALIDITY_SECS: u64 = 10 * 60;

/// A finished game as reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaySession {
    pub wallet: Address,
    pub score: u64,
    pub move_count: u32,
    pub session_duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPolicy {
    pub min_moves: u32,
    pub min_duration_ms: u64,
    pub claim_validity_secs: u64,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            min_moves: DEFAULT_MIN_MOVES,
            min_duration_ms: DEFAULT_MIN_DURATION_MS,
            claim_validity_secs: DEFAULT_CLAIM_VALIDITY_SECS,
        }
    }
}

impl SessionPolicy {
    /// Heuristic floors only; they raise the cost of trivial forgery.
    pub fn allows(&self, session: &PlaySession) -> bool {
        session.move_count >= self.min_moves && session.session_duration_ms >= self.min_duration_ms
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedClaim {
    pub claim: ScoreClaim,
    pub signature: Signature,
    pub ledger: Address,
}

/// Turns play sessions into signed [`ScoreClaim`]s.
///
/// Holds the only copy of the signing key. Stateless per call.
pub struct ClaimAuthorizer {
    signer: Option<PrivateKeySigner>,
    contract: Option<Address>,
    chain_id: u64,
    policy: SessionPolicy,
}

impl ClaimAuthorizer {
    pub fn new(
        signer: Option<PrivateKeySigner>,
        contract: Option<Address>,
        chain_id: u64,
        policy: SessionPolicy,
    ) -> Self {
        if signer.is_none() {
            warn!("Score authorizer has no signing key - /sign-score will answer NO_SIGNER");
        }
        if contract.is_none() {
            warn!("Score authorizer has no ledger address - /sign-score will answer NO_CONTRACT");
        }
        Self {
            signer,
            contract,
            chain_id,
            policy,
        }
    }

    /// Address the ledger must trust, if a key is configured.
    pub fn authorizer_address(&self) -> Option<Address> {
        self.signer.as_ref().map(|s| s.address())
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    pub fn authorize(&self, session: &PlaySession) -> Result<SignedClaim, AuthorizeError> {
        self.authorize_at(session, now_unix())
    }

    pub fn authorize_at(
        &self,
        session: &PlaySession,
        now: u64,
    ) -> Result<SignedClaim, AuthorizeError> {
        if !self.policy.allows(session) {
            debug!(
                "Rejecting short session for {}: {} moves, {} ms",
                wallet_key(&session.wallet),
                session.move_count,
                session.session_duration_ms
            );
            return Err(AuthorizeError::PlayMore {
                moves: session.move_count,
                duration_ms: session.session_duration_ms,
            });
        }

        let contract = self.contract.ok_or(AuthorizeError::NoContract)?;
        let signer = self.signer.as_ref().ok_or(AuthorizeError::NoSigner)?;

        let claim = ScoreClaim {
            wallet: session.wallet,
            score: session.score,
            valid_until: now.saturating_add(self.policy.claim_validity_secs),
            day: epoch_day(now),
        };

        let domain = ClaimDomain::new(self.chain_id, contract);
        let signature = signer
            .sign_hash_sync(&domain.signing_hash(&claim))
            .map_err(|e| AuthorizeError::Signing(e.to_string()))?;

        debug!(
            "Signed score {} for {} (day {}, valid until {})",
            claim.score,
            wallet_key(&claim.wallet),
            claim.day,
            claim.valid_until
        );

        Ok(SignedClaim {
            claim,
            signature,
            ledger: contract,
        })
    }
}

/// Proof that the submitter controls a wallet: an EIP-191 personal signature
/// over the raw authorizer signature bytes.
pub fn sign_caller_proof(
    wallet: &PrivateKeySigner,
    claim_signature: &Signature,
) -> Result<Signature, alloy::signers::Error> {
    wallet.sign_message_sync(&claim_signature.as_bytes())
}

pub fn recover_caller(claim_signature: &Signature, caller_proof: &Signature) -> Option<Address> {
    caller_proof
        .recover_address_from_msg(claim_signature.as_bytes())
        .ok()
}
