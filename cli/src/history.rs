//! Liquidation history from auction event logs

use alloy_primitives::{B256, U256};
use anyhow::{bail, Result};
use colored::Colorize;
use log::{info, warn};

use crate::client::ChainReader;
use crate::contracts::{
    fetch_events, AuctionEnded, BidPlaced, InsolventAuctionStarted, Logged, SecurityModulePaidOut, Session,
    SolventAuctionStarted,
};
use crate::display;

/// One solvent auction of an account, as bounded by its start and end logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationWindow {
    pub start_block: u64,
    pub start_transaction: B256,
    /// `None` while the auction is still running
    pub end_block: Option<u64>,
}

/// Blocks produced in `days` at `block_time_secs` per block
pub fn blocks_for_days(days: f64, block_time_secs: u64) -> u64 {
    if days.is_nan() || days <= 0.0 || block_time_secs == 0 {
        return 0;
    }
    (days * 86_400.0 / block_time_secs as f64).floor() as u64
}

/// Match each end log of `account` to the earliest start before it that has
/// not already ended. Starts keep their log order.
pub fn pair_auctions(
    account: U256,
    starts: &[Logged<SolventAuctionStarted>],
    ends: &[Logged<AuctionEnded>],
) -> Vec<LiquidationWindow> {
    let mut windows: Vec<LiquidationWindow> = starts
        .iter()
        .filter(|s| s.event.accountId == account)
        .map(|s| LiquidationWindow {
            start_block: s.block_number,
            start_transaction: s.transaction_hash,
            end_block: None,
        })
        .collect();

    for end in ends.iter().filter(|e| e.event.accountId == account) {
        if let Some(window) = windows
            .iter_mut()
            .find(|w| w.start_block < end.block_number && w.end_block.is_none())
        {
            window.end_block = Some(end.block_number);
        }
    }
    windows
}

/// Fees charged across every solvent auction start
pub fn total_fees(starts: &[Logged<SolventAuctionStarted>]) -> U256 {
    starts
        .iter()
        .fold(U256::ZERO, |sum, s| sum.saturating_add(s.event.fee))
}

pub fn total_paid_out(payouts: &[Logged<SecurityModulePaidOut>]) -> U256 {
    payouts
        .iter()
        .fold(U256::ZERO, |sum, p| sum.saturating_add(p.event.cashAmountPaid))
}

async fn block_range<C: ChainReader>(session: &Session<C>, days: f64) -> Result<(u64, u64)> {
    if days.is_nan() || days <= 0.0 {
        bail!("--days must be positive, got {days}");
    }
    let latest = session.chain.block_number().await?;
    let from = latest.saturating_sub(blocks_for_days(days, session.config.block_time_secs));
    display::field("From block", from);
    display::field("To block", latest);
    Ok((from, latest))
}

async fn print_snapshot<C: ChainReader>(
    session: &Session<C>,
    title: &str,
    account: U256,
    block: u64,
    spot: bool,
) -> Result<()> {
    println!("\n{} {}", format!("### {title}").bright_yellow(), format!("(block {block})").dimmed());
    let details = session.account_details(account, Some(block)).await?;
    let prices = if spot {
        Some(session.spot_prices(&details.portfolio, Some(block)).await?)
    } else {
        None
    };
    display::print_account(&details, prices.as_ref());
    Ok(())
}

pub async fn account_history<C: ChainReader>(
    session: &Session<C>,
    account: U256,
    days: f64,
    spot: bool,
) -> Result<Vec<LiquidationWindow>> {
    display::heading("Liquidation History");
    display::field("Subaccount", account);
    info!("Reading auction events for {} over the last {} day(s)", account, days);
    let (from, latest) = block_range(session, days).await?;

    let auction = session.config.contracts.auction;
    let starts = fetch_events::<SolventAuctionStarted>(&session.chain, auction, from, Some(latest)).await?;
    let ends = fetch_events::<AuctionEnded>(&session.chain, auction, from, Some(latest)).await?;
    display::field("Solvent auctions started", starts.len());
    display::field("Total fees", display::format_amount(total_fees(&starts)));

    match session.config.contracts.security_module {
        Some(module) => {
            let payouts = fetch_events::<SecurityModulePaidOut>(&session.chain, module, from, Some(latest)).await?;
            display::field("Security module payouts", payouts.len());
            display::field("Total paid out", display::format_amount(total_paid_out(&payouts)));
        }
        None => warn!("No security_module configured, skipping payouts"),
    }

    let windows = pair_auctions(account, &starts, &ends);
    if windows.is_empty() {
        println!("\n{}", "No liquidations of this subaccount in range".dimmed());
        return Ok(windows);
    }

    for window in &windows {
        let end = window
            .end_block
            .map(|b| b.to_string())
            .unwrap_or_else(|| "ongoing".to_string());
        println!(
            "\n{} {} from block {} to {}",
            "## Liquidation of subaccount".bright_green().bold(),
            account,
            window.start_block,
            end
        );
        display::field("Transaction", window.start_transaction);

        let start = window.start_block;
        print_snapshot(session, "Before flagging", account, start.saturating_sub(1), false).await?;
        print_snapshot(session, "After flagging", account, start, spot).await?;

        match window.end_block {
            Some(end) => {
                print_snapshot(session, "Before auction end", account, end.saturating_sub(1), false).await?;
                print_snapshot(session, "After auction end", account, end, false).await?;
            }
            None => println!("\n{}", "Auction has not ended yet".yellow()),
        }
    }
    Ok(windows)
}

pub async fn all_history<C: ChainReader>(
    session: &Session<C>,
    days: f64,
    accounts: bool,
    spot: bool,
) -> Result<usize> {
    display::heading("All Liquidations");
    info!("Reading every auction event over the last {} day(s)", days);
    let (from, latest) = block_range(session, days).await?;

    let auction = session.config.contracts.auction;
    let solvent = fetch_events::<SolventAuctionStarted>(&session.chain, auction, from, Some(latest)).await?;
    let insolvent = fetch_events::<InsolventAuctionStarted>(&session.chain, auction, from, Some(latest)).await?;
    let ended = fetch_events::<AuctionEnded>(&session.chain, auction, from, Some(latest)).await?;
    let bids = fetch_events::<BidPlaced>(&session.chain, auction, from, Some(latest)).await?;

    display::field("Solvent auctions", solvent.len());
    display::field("Insolvent auctions", insolvent.len());
    display::field("Auctions ended", ended.len());
    display::field("Bids", bids.len());
    display::field("Total fees", display::format_amount(total_fees(&solvent)));

    if spot && !accounts {
        warn!("--spot needs --accounts, ignoring it");
    }

    let total = solvent.len();
    for (n, start) in solvent.iter().enumerate() {
        println!(
            "\n{} Solvent auction of subaccount {}; block {}; tx {}",
            format!("## [{}/{}]", n + 1, total).bright_green().bold(),
            start.event.accountId,
            start.block_number,
            start.transaction_hash
        );
        if !accounts {
            continue;
        }

        let details = session
            .account_details(start.event.accountId, Some(start.block_number.saturating_sub(1)))
            .await?;
        let prices = if spot {
            Some(session.spot_prices(&details.portfolio, Some(start.block_number)).await?)
        } else {
            None
        };
        display::print_account(&details, prices.as_ref());
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolCall;
    use crate::bindings::ISubAccounts;
    use crate::testing::{fake_config, w, FakeChain, AUCTION, CASH, SECURITY_MODULE};

    fn logged<E>(event: E, block_number: u64) -> Logged<E> {
        Logged {
            event,
            block_number,
            transaction_hash: B256::with_last_byte(block_number as u8),
        }
    }

    fn start(account: u64, block: u64, fee: u64) -> Logged<SolventAuctionStarted> {
        logged(
            SolventAuctionStarted {
                accountId: U256::from(account),
                scenarioId: U256::ZERO,
                markToMarket: w("1"),
                fee: U256::from(fee),
            },
            block,
        )
    }

    fn end(account: u64, block: u64) -> Logged<AuctionEnded> {
        logged(
            AuctionEnded {
                accountId: U256::from(account),
                endTime: U256::from(block * 2),
            },
            block,
        )
    }

    #[test]
    fn test_blocks_for_days() {
        assert_eq!(blocks_for_days(7.0, 2), 302_400);
        assert_eq!(blocks_for_days(0.5, 2), 21_600);
        assert_eq!(blocks_for_days(1.0, 12), 7_200);
        assert_eq!(blocks_for_days(-1.0, 2), 0);
        assert_eq!(blocks_for_days(f64::NAN, 2), 0);
    }

    #[test]
    fn test_pairing_takes_first_open_earlier_start() {
        let account = U256::from(5u64);
        let starts = vec![start(5, 100, 1), start(6, 105, 1), start(5, 200, 1), start(5, 300, 1)];
        // The end at block 100 is not after any start; the rest pair in order
        let ends = vec![end(5, 100), end(6, 150), end(5, 150), end(5, 250)];

        let windows = pair_auctions(account, &starts, &ends);
        let spans: Vec<(u64, Option<u64>)> = windows.iter().map(|w| (w.start_block, w.end_block)).collect();
        assert_eq!(spans, vec![(100, Some(150)), (200, Some(250)), (300, None)]);
    }

    #[test]
    fn test_totals() {
        let starts = vec![start(1, 10, 3), start(2, 11, 4)];
        assert_eq!(total_fees(&starts), U256::from(7u64));

        let payouts = vec![
            logged(
                SecurityModulePaidOut {
                    accountId: U256::from(1u64),
                    cashAmountNeeded: U256::from(10u64),
                    cashAmountPaid: U256::from(6u64),
                },
                12,
            ),
            logged(
                SecurityModulePaidOut {
                    accountId: U256::from(2u64),
                    cashAmountNeeded: U256::from(1u64),
                    cashAmountPaid: U256::from(1u64),
                },
                13,
            ),
        ];
        assert_eq!(total_paid_out(&payouts), U256::from(7u64));
        assert_eq!(total_fees(&[]), U256::ZERO);
    }

    #[tokio::test]
    async fn test_account_history_reads_snapshots_at_boundaries() {
        let chain = FakeChain::with_eth_market();
        chain.set_block_number(1_000);
        let id = U256::from(4u64);
        chain.emit_solvent_start(4, 900, 2);
        chain.emit(AUCTION, 950, &AuctionEnded { accountId: id, endTime: U256::ZERO });
        chain.emit_solvent_start(4, 980, 3);
        chain.emit(
            SECURITY_MODULE,
            960,
            &SecurityModulePaidOut {
                accountId: id,
                cashAmountNeeded: U256::from(5u64),
                cashAmountPaid: U256::from(5u64),
            },
        );
        chain.respond_trade_id(id, 0);
        chain.respond_balances(id, &[(CASH, U256::ZERO, w("10"))]);
        chain.respond_balances_at(Some(899), id, &[(CASH, U256::ZERO, w("50"))]);

        let session = Session::connect(chain, fake_config()).await.unwrap();
        let windows = account_history(&session, id, 1.0, false).await.unwrap();

        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].end_block, Some(950));
        assert_eq!(windows[1].end_block, None);
        // Four snapshots for the finished auction, two for the open one
        assert_eq!(session.chain.call_count(ISubAccounts::getAccountBalancesCall::SIGNATURE), 6);
    }

    #[tokio::test]
    async fn test_all_history_counts_solvent_starts_in_range() {
        let chain = FakeChain::with_eth_market();
        chain.set_block_number(100_000);
        // Outside a one day window at 2s blocks (43_200 blocks)
        chain.emit_solvent_start(1, 10, 0);
        chain.emit_solvent_start(2, 90_000, 0);
        chain.emit_solvent_start(3, 95_000, 0);

        let session = Session::connect(chain, fake_config()).await.unwrap();
        assert_eq!(all_history(&session, 1.0, false, false).await.unwrap(), 2);
        assert!(all_history(&session, 0.0, false, false).await.is_err());
    }
}
