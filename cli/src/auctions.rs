//! Auction discovery and quoting

use alloy_primitives::U256;
use anyhow::{Context, Result};
use auction_model::{quote, AccountDetails, AuctionParams, AuctionQuote, AuctionState};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};

use crate::client::{in_windows, ChainReader};
use crate::contracts::Session;
use crate::display;

/// Current unix time in seconds
pub fn now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// One ongoing auction with everything needed to bid on it
#[derive(Debug, Clone)]
pub struct AuctionSummary {
    pub state: AuctionState,
    pub details: AccountDetails,
    /// `None` when margin is unknown or the auction cannot be priced
    pub quote: Option<AuctionQuote>,
}

fn progress_bar(len: usize, message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{msg} [{bar:30.cyan/blue}] {pos}/{len}") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(message);
    bar
}

pub fn quote_for(state: &AuctionState, details: &AccountDetails, params: &AuctionParams, now: u64) -> Option<AuctionQuote> {
    let margin = details.margin.as_ref()?;
    match quote(state, margin, params, now) {
        Ok(q) => Some(q),
        Err(e) => {
            warn!("Cannot price auction {}: {}", state.sub_account_id, e);
            None
        }
    }
}

/// Discover every ongoing auction and quote it at `now`.
///
/// States and account details are fetched in windows of `batch_size`; an
/// account whose reads fail is skipped with a warning so one bad account
/// never hides the rest.
pub async fn scan<C: ChainReader>(
    session: &Session<C>,
    params: &AuctionParams,
    now: u64,
    show_progress: bool,
) -> Result<Vec<AuctionSummary>> {
    let ids: Vec<U256> = session.auction_account_ids().await?.into_iter().collect();
    info!("Found {} account(s) with auction history", ids.len());
    let window = session.config.batch_size;

    let bar = show_progress.then(|| progress_bar(ids.len(), "auction states"));
    let states = in_windows(&ids, window, bar.as_ref(), |id| session.auction(*id)).await;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let mut ongoing = Vec::new();
    for (id, state) in ids.iter().zip(states) {
        match state {
            Ok(state) if state.ongoing => ongoing.push(state),
            Ok(_) => debug!("Auction {} is not ongoing", id),
            Err(e) => warn!("Skipping auction {}: {:#}", id, e),
        }
    }
    info!("{} ongoing auction(s)", ongoing.len());

    let bar = show_progress.then(|| progress_bar(ongoing.len(), "account details"));
    let details = in_windows(&ongoing, window, bar.as_ref(), |state| {
        session.account_details(state.sub_account_id, None)
    })
    .await;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let mut summaries = Vec::new();
    for (state, details) in ongoing.into_iter().zip(details) {
        match details {
            Ok(details) => {
                let quote = quote_for(&state, &details, params, now);
                summaries.push(AuctionSummary {
                    state,
                    details,
                    quote,
                });
            }
            Err(e) => warn!("Skipping account {}: {:#}", state.sub_account_id, e),
        }
    }
    Ok(summaries)
}

pub fn print_summary(summary: &AuctionSummary) {
    let kind = if summary.state.insolvent {
        "insolvent".red()
    } else {
        "solvent".yellow()
    };
    println!(
        "\n{} {} ({})",
        "Auction".bright_green().bold(),
        summary.state.sub_account_id,
        kind
    );
    display::print_account(&summary.details, None);
    match &summary.quote {
        Some(q) => display::print_quote(q),
        None => display::field("Bid price", "unknown".yellow()),
    }
}

pub async fn list_auctions<C: ChainReader>(session: &Session<C>) -> Result<()> {
    display::heading("Ongoing Auctions");
    let params = session.auction_params().await?;
    let summaries = scan(session, &params, now(), true).await?;

    if summaries.is_empty() {
        println!("\n{}", "No ongoing auctions".dimmed());
        return Ok(());
    }
    for summary in &summaries {
        print_summary(summary);
    }
    println!("\n{} {}", "Total:".bright_cyan(), summaries.len());
    Ok(())
}

pub async fn show_auction<C: ChainReader>(session: &Session<C>, sub_account_id: U256) -> Result<()> {
    display::heading("Auction");
    let state = session
        .auction(sub_account_id)
        .await
        .with_context(|| format!("reading auction {sub_account_id}"))?;
    display::field("Subaccount", sub_account_id);
    display::print_auction_state(&state);

    if !state.ongoing {
        println!("\n{}", "Auction is not ongoing".yellow());
        return Ok(());
    }

    let params = session.auction_params().await?;
    let details = session.account_details(sub_account_id, None).await?;
    println!();
    display::print_account(&details, None);
    match quote_for(&state, &details, &params, now()) {
        Some(q) => display::print_quote(&q),
        None => display::field("Bid price", "unknown".yellow()),
    }
    Ok(())
}

pub async fn show_params<C: ChainReader>(session: &Session<C>) -> Result<()> {
    display::heading("Auction Parameters");
    let params = session.auction_params().await?;
    display::print_params(&params);
    if let Err(e) = params.validate() {
        println!("{} {}", "Warning:".yellow(), e);
    }
    Ok(())
}
