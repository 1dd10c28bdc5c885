//! Points command

use crate::client::GmClient;
use crate::style::*;
use anyhow::Result;

pub async fn run(server: &str, wallet: &str) -> Result<()> {
    print_header(&format!("GM Points for {}", short_wallet(wallet)));

    let points = GmClient::new(server).get_points(wallet).await?;

    println!();
    println!("  Wallet:          {}", points.wallet);
    println!("  Total points:    {}", style_bold(&points.total_points.to_string()));
    println!("  Current streak:  {} day(s)", points.current_streak);
    match points.last_claim_day {
        Some(day) => println!("  Last claim day:  {}", day),
        None => println!("  Last claim day:  {}", style_dim("never")),
    }
    match points.leaderboard_points {
        Some(p) if p != points.total_points => println!(
            "  Leaderboard:     {} {}",
            p,
            style_yellow("(pending reindex)")
        ),
        Some(p) => println!("  Leaderboard:     {}", p),
        None => println!("  Leaderboard:     {}", style_dim("not ranked")),
    }
    println!();

    Ok(())
}
