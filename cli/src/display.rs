//! Terminal rendering shared by the commands

use alloy_primitives::{I256, U256};
use auction_model::fixed::format_wad;
use auction_model::{AccountDetails, AccountPortfolio, AuctionParams, AuctionQuote, AuctionState};
use colored::{ColoredString, Colorize};
use std::collections::BTreeMap;

/// Signed amount coloured by sign: red below zero, yellow at zero, green above
pub fn prettify(value: I256) -> ColoredString {
    let text = format_wad(value);
    if value.is_negative() {
        text.red()
    } else if value.is_zero() {
        text.yellow()
    } else {
        text.green()
    }
}

pub fn heading(title: &str) {
    println!("{}", format!("=== {title} ===").bright_green().bold());
}

pub fn field(label: &str, value: impl std::fmt::Display) {
    println!("{} {}", format!("{label}:").bright_cyan(), value);
}

/// Lines of the portfolio tree, without colour codes
pub fn portfolio_lines(portfolio: &AccountPortfolio) -> Vec<(usize, String, I256)> {
    let mut lines = vec![(0, "cash".to_string(), portfolio.cash)];

    for (currency, market) in &portfolio.markets {
        lines.push((0, currency.clone(), I256::ZERO));
        if !market.base.is_zero() {
            lines.push((1, "base".to_string(), market.base));
        }
        if !market.perp.position.is_zero() || !market.perp.unrealized_pnl.is_zero() {
            lines.push((1, "perp".to_string(), market.perp.position));
            lines.push((2, "unrealized pnl".to_string(), market.perp.unrealized_pnl));
        }
        for (option, amount) in &market.options {
            lines.push((1, option.key(), *amount));
        }
    }
    lines
}

pub fn print_portfolio(portfolio: &AccountPortfolio) {
    for (depth, label, amount) in portfolio_lines(portfolio) {
        let indent = "  ".repeat(depth + 1);
        // Currency headers carry no amount of their own
        if depth == 0 && label != "cash" {
            println!("{}{}", indent, label.bright_yellow());
        } else {
            println!("{}{} {}", indent, format!("{label}:").bright_cyan(), prettify(amount));
        }
    }

    if !portfolio.unknown.is_empty() {
        println!("  {}", "Unknown assets:".red());
        for balance in &portfolio.unknown {
            println!(
                "    {} subId {} amount {}",
                balance.asset,
                balance.sub_id,
                prettify(balance.amount)
            );
        }
    }
}

pub fn print_account(details: &AccountDetails, spot_prices: Option<&BTreeMap<String, Option<I256>>>) {
    field("Subaccount", details.sub_account_id);
    field("Last trade id", details.last_trade_id);
    match &details.margin {
        Some(margin) => {
            field("MtM", prettify(margin.mtm));
            field("MM", prettify(margin.mm));
            field("Worst scenario", margin.worst_scenario);
        }
        None => field("Margin", "unknown (feeds stale)".yellow()),
    }

    println!("{}", "Portfolio:".bright_cyan());
    print_portfolio(&details.portfolio);

    if let Some(prices) = spot_prices {
        println!("{}", "Spot prices:".bright_cyan());
        for (currency, price) in prices {
            match price {
                Some(price) => println!("  {} {}", format!("{currency}:").bright_cyan(), format_wad(*price)),
                None => println!("  {} {}", format!("{currency}:").bright_cyan(), "unavailable".yellow()),
            }
        }
    }
}

pub fn print_auction_state(state: &AuctionState) {
    field("Ongoing", state.ongoing);
    field("Insolvent", state.insolvent);
    field("Scenario", state.cached_scenario_id);
    field("Start time", format_unix(state.start_time));
    field("Reserved cash", prettify(state.reserved_cash));
}

pub fn print_quote(quote: &AuctionQuote) {
    field("Phase", quote.phase);
    field("Bid price", prettify(quote.price));
    field("Discount", format_wad(quote.discount));
    field("Buffer margin", prettify(quote.buffer_margin));
    match quote.max_proportion {
        Some(max) => field("Max bid percentage", format_wad(max)),
        None => field("Max bid percentage", "undefined".yellow()),
    }
}

pub fn print_params(params: &AuctionParams) {
    field("Starting MtM percentage", format_wad(params.starting_mtm_percentage));
    field("Fast auction cutoff", format_wad(params.fast_auction_cutoff_percentage));
    field("Fast auction length", format!("{}s", params.fast_auction_length));
    field("Slow auction length", format!("{}s", params.slow_auction_length));
    field("Insolvent auction length", format!("{}s", params.insolvent_auction_length));
    field("Liquidator fee rate", format_wad(params.liquidator_fee_rate));
    field("Buffer margin percentage", format_wad(params.buffer_margin_percentage));
}

/// Unsigned protocol amount at 18 decimals
pub fn format_amount(value: U256) -> String {
    match I256::try_from(value) {
        Ok(v) => format_wad(v),
        Err(_) => value.to_string(),
    }
}

pub fn format_unix(seconds: u64) -> String {
    i64::try_from(seconds)
        .ok()
        .and_then(|s| chrono::DateTime::<chrono::Utc>::from_timestamp(s, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| seconds.to_string())
}
