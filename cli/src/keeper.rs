//! Auction monitoring loop

use anyhow::Result;
use auction_model::fixed::format_wad;
use auction_model::AuctionParams;
use colored::Colorize;
use log::{error, info};
use std::time::Duration;
use tokio::time::sleep;

use crate::auctions::{now, scan, AuctionSummary};
use crate::client::ChainReader;
use crate::contracts::Session;

/// One line per auction: id, kind, price and how much of it is biddable
pub fn summary_line(summary: &AuctionSummary) -> String {
    let kind = if summary.state.insolvent { "insolvent" } else { "solvent" };
    match &summary.quote {
        Some(q) => format!(
            "{} ({}) price {} discount {} max {}",
            summary.state.sub_account_id,
            kind,
            format_wad(q.price),
            format_wad(q.discount),
            q.max_proportion.map_or_else(|| "undefined".to_string(), format_wad)
        ),
        None => format!("{} ({}) price unknown", summary.state.sub_account_id, kind),
    }
}

async fn tick<C: ChainReader>(session: &Session<C>, params: &AuctionParams) -> Result<usize> {
    let summaries = scan(session, params, now(), false).await?;
    if summaries.is_empty() {
        println!("  {} No ongoing auctions", "ℹ".blue());
    }
    for summary in &summaries {
        println!("  {} {}", "●".yellow(), summary_line(summary));
    }
    Ok(summaries.len())
}

/// Scan and quote every `interval` seconds. Runs forever unless `iterations` is given.
pub async fn run_keeper<C: ChainReader>(session: &Session<C>, interval: u64, iterations: Option<u64>) -> Result<()> {
    println!("{}", "=== Starting Auction Monitor ===".bright_green().bold());
    println!("{} {}", "Auction:".bright_cyan(), session.config.contracts.auction);
    println!("{} {}s", "Interval:".bright_cyan(), interval);
    println!("\n{}", "Monitor is running...".bright_green());
    println!("{}", "(Press Ctrl+C to stop)".dimmed());

    let params = session.auction_params().await?;
    params.validate()?;
    let interval = Duration::from_secs(interval);
    let mut round = 0u64;

    loop {
        round += 1;
        println!(
            "\n{}",
            format!("[{}] Checking auctions...", chrono::Local::now().format("%H:%M:%S")).dimmed()
        );

        match tick(session, &params).await {
            Ok(count) => info!("Round {}: {} ongoing auction(s)", round, count),
            Err(e) => error!("Round {} failed: {:#}", round, e),
        }

        if iterations.is_some_and(|limit| round >= limit) {
            return Ok(());
        }
        sleep(interval).await;
    }
}
