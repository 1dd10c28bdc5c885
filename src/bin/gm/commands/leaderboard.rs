//! Leaderboard command

use crate::client::GmClient;
use crate::style::*;
use anyhow::Result;

pub async fn run(server: &str, limit: usize) -> Result<()> {
    print_header("GM Points Leaderboard");

    let entries = GmClient::new(server).get_leaderboard(limit).await?;
    if entries.is_empty() {
        print_info("No claims indexed yet.");
        return Ok(());
    }

    println!();
    println!("{:>4}  {:<44}  {:>10}", "Rank", "Wallet", "Points");
    println!("{}", "─".repeat(62));

    for (i, entry) in entries.iter().enumerate() {
        let rank = format!("#{}", i + 1);
        let rank_styled = if i == 0 {
            style_yellow(&rank)
        } else if i < 3 {
            style_cyan(&rank)
        } else {
            rank
        };

        println!("{:>4}  {:<44}  {:>10}", rank_styled, entry.user, entry.points);
    }

    println!();
    println!("Total wallets: {}", entries.len());
    Ok(())
}
