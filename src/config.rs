//! Configuration management
//!
//! Loads configuration from config.toml with support for:
//! - Server binding settings
//! - SQLite database location
//! - Chain / ledger identity bound into claim signatures
//! - Reward parameters (score tiers, anti-abuse floors, claim window)
//! - Indexer source and polling
//!
//! Environment variables take precedence over the file. The authorizer's
//! private key is only ever read from `SIGNER_PRIVATE_KEY`.

use std::path::Path;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::SessionPolicy;
use crate::scoring::ScoreTiers;
use crate::typed_data::parse_wallet;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub chain: ChainConfig,
    pub rewards: RewardsConfig,
    pub indexer: IndexerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// Ledger identity; empty means unset
    #[serde(default)]
    pub contract_address: String,
    /// Trusted authorizer when this process has no signing key
    #[serde(default)]
    pub authorizer_address: String,
    #[serde(default)]
    pub rpc_url: String,
    #[serde(default)]
    pub from_block: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// `[threshold, multiplier]` pairs, ascending
    pub score_tiers: Vec<(u64, u8)>,
    pub claim_validity_secs: u64,
    pub min_moves: u32,
    pub min_duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexerSource {
    Local,
    Rpc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    pub source: IndexerSource,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
}

impl Config {
    /// Load from config.toml or use defaults, then apply env overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from("config.toml")?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load from specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            toml::from_str(DEFAULT_CONFIG).context("Failed to parse default config")
        }
    }

    fn apply_env(&mut self) {
        fn env(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }

        if let Some(host) = env("GM_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env("GM_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(path) = env("GM_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(chain_id) = env("GM_CHAIN_ID").and_then(|c| c.parse().ok()) {
            self.chain.chain_id = chain_id;
        }
        if let Some(contract) = env("GM_CONTRACT_ADDRESS") {
            self.chain.contract_address = contract;
        }
        if let Some(authorizer) = env("GM_AUTHORIZER_ADDRESS") {
            self.chain.authorizer_address = authorizer;
        }
        if let Some(rpc) = env("GM_RPC_URL") {
            self.chain.rpc_url = rpc;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.score_tiers().context("Invalid rewards.score_tiers")?;
        if !self.chain.contract_address.trim().is_empty() && self.contract_address().is_none() {
            bail!("chain.contract_address is not a valid address");
        }
        if !self.chain.authorizer_address.trim().is_empty() && self.authorizer_address().is_none() {
            bail!("chain.authorizer_address is not a valid address");
        }
        if self.indexer.source == IndexerSource::Rpc {
            if self.chain.rpc_url.trim().is_empty() {
                bail!("indexer.source = \"rpc\" requires chain.rpc_url");
            }
            if self.contract_address().is_none() {
                bail!("indexer.source = \"rpc\" requires chain.contract_address");
            }
        }
        if self.indexer.poll_interval_secs == 0 {
            bail!("indexer.poll_interval_secs must be positive");
        }
        Ok(())
    }

    pub fn score_tiers(&self) -> Result<ScoreTiers> {
        Ok(ScoreTiers::new(&self.rewards.score_tiers)?)
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            min_moves: self.rewards.min_moves,
            min_duration_ms: self.rewards.min_duration_ms,
            claim_validity_secs: self.rewards.claim_validity_secs,
        }
    }

    pub fn contract_address(&self) -> Option<Address> {
        parse_wallet(&self.chain.contract_address)
    }

    pub fn authorizer_address(&self) -> Option<Address> {
        parse_wallet(&self.chain.authorizer_address)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.indexer.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.indexer.request_timeout_secs.max(1))
    }

    /// Authorizer key from `SIGNER_PRIVATE_KEY`, if set.
    pub fn signer_from_env() -> Result<Option<PrivateKeySigner>> {
        match std::env::var("SIGNER_PRIVATE_KEY") {
            Ok(key) if !key.trim().is_empty() => {
                let signer = key
                    .trim()
                    .parse::<PrivateKeySigner>()
                    .context("SIGNER_PRIVATE_KEY is not a valid secp256k1 key")?;
                Ok(Some(signer))
            }
            _ => Ok(None),
        }
    }

    /// Bearer token for the leaderboard admin write, if set.
    pub fn admin_token_from_env() -> Option<String> {
        std::env::var("GM_ADMIN_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

impl Default for Config {
    fn default() -> Self {
        // The embedded default config is validated by the tests below,
        // so this should never fail. Using a fallback for robustness.
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|_| Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                path: "gm-points.db".to_string(),
            },
            chain: ChainConfig {
                chain_id: 8453,
                contract_address: String::new(),
                authorizer_address: String::new(),
                rpc_url: String::new(),
                from_block: 0,
            },
            rewards: RewardsConfig {
                score_tiers: vec![(0, 1), (16_000, 3)],
                claim_validity_secs: 600,
                min_moves: 10,
                min_duration_ms: 15_000,
            },
            indexer: IndexerConfig {
                source: IndexerSource::Local,
                poll_interval_secs: 60,
                request_timeout_secs: 30,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_default_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        config.validate().unwrap();
        assert_eq!(config.chain.chain_id, 8453);
        assert_eq!(config.indexer.source, IndexerSource::Local);
        assert_eq!(config.score_tiers().unwrap().multiplier_for(16_000), 3);
        assert_eq!(config.session_policy(), SessionPolicy::default());
        assert!(config.contract_address().is_none());
    }

    #[test]
    fn test_rejects_bad_tiers() {
        let mut config = Config::default();
        config.rewards.score_tiers = vec![(100, 2), (50, 3)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rpc_source_needs_url_and_contract() {
        let mut config = Config::default();
        config.indexer.source = IndexerSource::Rpc;
        assert!(config.validate().is_err());

        config.chain.rpc_url = "http://localhost:8545".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("contract_address"));

        config.chain.contract_address = "0x00000000000000000000000000000000000000c0".to_string();
        config.validate().unwrap();
    }

    #[test]
    fn test_bad_contract_address() {
        let mut config = Config::default();
        config.chain.contract_address = "0x1234".to_string();
        assert!(config.validate().is_err());
        config.chain.contract_address = "0x00000000000000000000000000000000000000c0".to_string();
        config.validate().unwrap();
        let contract = config.contract_address().unwrap();
        assert_eq!(contract.as_slice()[19], 0xc0);
    }
}
