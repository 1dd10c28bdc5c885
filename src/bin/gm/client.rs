//! GM Points API client

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Leaderboard entry
#[derive(Debug, Deserialize)]
pub struct Leader {
    pub user: String,
    pub points: u64,
}

#[derive(Debug, Deserialize)]
struct LeaderboardResponse {
    #[serde(default)]
    leaders: Vec<Leader>,
}

/// Ledger record for one wallet
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsResponse {
    pub wallet: String,
    pub total_points: u64,
    pub last_claim_day: Option<u64>,
    pub current_streak: u64,
    pub leaderboard_points: Option<u64>,
}

/// Reconcile outcome
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReindexResponse {
    pub processed_count: usize,
    pub checkpoint_after: Option<u64>,
    #[serde(default)]
    pub coalesced: bool,
}

pub struct GmClient {
    client: Client,
    base_url: String,
}

impl GmClient {
    pub fn new(server_url: &str) -> Self {
        // Build HTTP client with timeout, falling back to default client if builder fails
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: server_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn read<T: for<'de> Deserialize<'de>>(resp: reqwest::Response, what: &str) -> Result<T> {
        let status = resp.status();
        if status.is_success() {
            Ok(resp.json().await?)
        } else {
            let error_text = resp.text().await.unwrap_or_else(|_| "Unknown error".into());
            Err(anyhow!("Failed to {} ({}): {}", what, status, error_text))
        }
    }

    pub async fn get_leaderboard(&self, limit: usize) -> Result<Vec<Leader>> {
        let url = self.url(&format!("leaderboard?n={}", limit));
        let resp = self.client.get(&url).send().await?;
        let data: LeaderboardResponse = Self::read(resp, "fetch leaderboard").await?;
        Ok(data.leaders)
    }

    pub async fn get_points(&self, wallet: &str) -> Result<PointsResponse> {
        let url = self.url(&format!("points/{}", wallet));
        let resp = self.client.get(&url).send().await?;
        Self::read(resp, "fetch points").await
    }

    pub async fn reindex(&self) -> Result<ReindexResponse> {
        let url = self.url("reindex");
        let resp = self.client.post(&url).send().await?;
        Self::read(resp, "reindex").await
    }
}
