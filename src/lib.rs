//! GM Points - daily on-chain check-in rewards for a browser game
//!
//! Players finish a game session and ask the server to attest their score.
//! The signed attestation is redeemed once per UTC day on the claim ledger,
//! which scales the score by a tier multiplier and the player's consecutive
//! day streak. An indexer folds the ledger's claim events into a ranked
//! leaderboard.
//!
//! # How it works
//!
//! 1. `/sign-score` checks the session against anti-abuse floors and returns
//!    an EIP-712 signed `ScoreClaim` bound to one chain and ledger
//! 2. `/claim` verifies the signature, expiry and caller, then atomically
//!    updates the wallet's streak and points
//! 3. The indexer reconciles claim events past its checkpoint into the
//!    leaderboard, on a timer or via `/reindex`
//!
//! # Anti-abuse measures
//!
//! - Minimum move count and session duration before a score is signed
//! - Claims expire after a short validity window
//! - One claim per wallet per day, enforced under a per-wallet lock
//! - The submitter must prove control of the claim wallet

pub mod auth;
pub mod config;
pub mod error;
pub mod event_source;
pub mod indexer;
pub mod leaderboard;
pub mod ledger;
pub mod scoring;
pub mod server;
pub mod storage;
pub mod typed_data;
pub mod types;

pub use auth::{ClaimAuthorizer, PlaySession, SessionPolicy, SignedClaim};
pub use config::Config;
pub use error::{AuthorizeError, ClaimError, ErrorKind, IndexerError, StorageError};
pub use event_source::{EventSource, LocalEventLog, RpcEventSource};
pub use indexer::{ChainIndexer, ReconcileReport};
pub use leaderboard::{IndexStore, LeaderboardStore};
pub use ledger::{ClaimLedger, ClaimReceipt};
pub use scoring::{epoch_day, next_streak, ScoreTiers};
pub use storage::GmStorage;
pub use typed_data::{ClaimDomain, ScoreClaim};
pub use types::{ClaimFinalizedRecord, LeaderboardEntry, WalletLedgerRecord};
