//! Reindex command

use crate::client::GmClient;
use crate::style::*;
use anyhow::Result;

pub async fn run(server: &str) -> Result<()> {
    let report = GmClient::new(server).reindex().await?;

    let up_to = report
        .checkpoint_after
        .map(|c| c.to_string())
        .unwrap_or_else(|| "-".to_string());
    print_success(&format!(
        "Reindexed {} claim(s), checkpoint {}",
        report.processed_count, up_to
    ));
    if report.coalesced {
        print_info("Joined a reconcile already in progress");
    }

    Ok(())
}
