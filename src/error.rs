//! Error taxonomy
//!
//! Every error carries a stable wire code and a [`ErrorKind`] so callers can
//! tell forged data apart from legitimate-but-untimely submissions, and
//! retryable infrastructure failures apart from fatal misconfiguration.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed request; never retried.
    Validation,
    /// Session too short to count; the player should keep playing.
    AntiAbuse,
    /// Bad, expired or misdirected attestation.
    Authorization,
    /// Legitimate claim that arrived on the wrong day.
    LedgerConflict,
    /// Storage or event source unavailable; retry with backoff.
    Infrastructure,
    /// Deployment is incomplete; fatal.
    Misconfiguration,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Infrastructure)
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },

    #[error("wallet record for {0} was advanced concurrently")]
    Conflict(String),

    #[error("storage task failed: {0}")]
    Blocking(String),
}

#[derive(Debug, Error)]
pub enum AuthorizeError {
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("session too short ({moves} moves, {duration_ms} ms)")]
    PlayMore { moves: u32, duration_ms: u64 },

    #[error("no signing key configured")]
    NoSigner,

    #[error("no ledger address configured")]
    NoContract,

    #[error("signing failed: {0}")]
    Signing(String),
}

impl AuthorizeError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthorizeError::InvalidBody(_) => "INVALID_BODY",
            AuthorizeError::PlayMore { .. } => "PLAY_MORE",
            AuthorizeError::NoSigner => "NO_SIGNER",
            AuthorizeError::NoContract => "NO_CONTRACT",
            AuthorizeError::Signing(_) => "SIGNING_FAILED",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthorizeError::InvalidBody(_) => ErrorKind::Validation,
            AuthorizeError::PlayMore { .. } => ErrorKind::AntiAbuse,
            AuthorizeError::NoSigner | AuthorizeError::NoContract => ErrorKind::Misconfiguration,
            AuthorizeError::Signing(_) => ErrorKind::Infrastructure,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("signature does not match the score authorizer")]
    InvalidSignature,

    #[error("claim expired at {valid_until} (now {now})")]
    ClaimExpired { valid_until: u64, now: u64 },

    #[error("caller is not the claim wallet")]
    WalletMismatch,

    #[error("already claimed on day {day}")]
    TooManyClaimsToday { day: u64 },

    #[error("claim day {day} is behind last claimed day {last_claim_day}")]
    StaleClaimDay { day: u64, last_claim_day: u64 },

    #[error("point total overflow")]
    PointsOverflow,

    #[error("ledger is not configured: {0}")]
    Unconfigured(&'static str),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("claim submission timed out")]
    Timeout,
}

impl ClaimError {
    pub fn code(&self) -> &'static str {
        match self {
            ClaimError::InvalidBody(_) => "INVALID_BODY",
            ClaimError::InvalidSignature => "INVALID_SIGNATURE",
            ClaimError::ClaimExpired { .. } => "CLAIM_EXPIRED",
            ClaimError::WalletMismatch => "WALLET_MISMATCH",
            ClaimError::TooManyClaimsToday { .. } => "TOO_MANY_CLAIMS_TODAY",
            ClaimError::StaleClaimDay { .. } => "STALE_CLAIM_DAY",
            ClaimError::PointsOverflow => "POINTS_OVERFLOW",
            ClaimError::Unconfigured(code) => code,
            ClaimError::Storage(_) => "STORAGE_UNAVAILABLE",
            ClaimError::Timeout => "TIMEOUT",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClaimError::InvalidBody(_) | ClaimError::PointsOverflow => ErrorKind::Validation,
            ClaimError::InvalidSignature
            | ClaimError::ClaimExpired { .. }
            | ClaimError::WalletMismatch => ErrorKind::Authorization,
            ClaimError::TooManyClaimsToday { .. } | ClaimError::StaleClaimDay { .. } => {
                ErrorKind::LedgerConflict
            }
            ClaimError::Unconfigured(_) => ErrorKind::Misconfiguration,
            ClaimError::Storage(_) | ClaimError::Timeout => ErrorKind::Infrastructure,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("event source error: {0}")]
    EventSource(String),

    #[error("undecodable claim log at position {position}: {detail}")]
    InvalidLog { position: u64, detail: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("indexer is not configured: {0}")]
    Unconfigured(&'static str),
}

impl IndexerError {
    pub fn code(&self) -> &'static str {
        match self {
            IndexerError::EventSource(_) => "EVENT_SOURCE_UNAVAILABLE",
            IndexerError::InvalidLog { .. } => "INVALID_LOG",
            IndexerError::Storage(_) => "STORAGE_UNAVAILABLE",
            IndexerError::Timeout(_) => "TIMEOUT",
            IndexerError::Unconfigured(code) => code,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            IndexerError::Unconfigured(_) => ErrorKind::Misconfiguration,
            _ => ErrorKind::Infrastructure,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TierError {
    #[error("score tier table is empty")]
    Empty,

    #[error("score tier thresholds must be strictly ascending (at {0})")]
    NotAscending(u64),

    #[error("score multipliers must be at least 1 and non-decreasing (at {0})")]
    BadMultiplier(u64),
}
