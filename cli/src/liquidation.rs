//! Liquidation bids

use alloy_primitives::{I256, U256};
use alloy_sol_types::SolCall;
use anyhow::{anyhow, Context, Result};
use auction_model::fixed::format_wad;
use auction_model::{size_bid, BidParams, BidPlan, BidRequest};
use colored::Colorize;
use log::info;

use crate::auctions::now;
use crate::bindings::IAuctionUtils;
use crate::client::{Call, ChainReader, Receipt, TxSender};
use crate::contracts::Session;
use crate::display;

/// What the operator asked for on the command line
#[derive(Debug, Clone)]
pub struct BidOptions {
    pub sub_account_id: U256,
    pub liquidator_sub_account_id: U256,
    pub percentage: I256,
    pub collateral_amount: Option<I256>,
    /// Zero skips the on-chain cost check
    pub max_cost: I256,
    /// Defaults to the account's current last trade id
    pub last_trade_id: Option<U256>,
    pub merge: bool,
    pub dry_run: bool,
}

pub fn advanced_bid_call(params: &BidParams) -> IAuctionUtils::advancedBidCall {
    IAuctionUtils::advancedBidCall {
        scenarioId: params.worst_scenario,
        accountId: params.sub_account_id,
        bidderId: params.liquidator_sub_account_id,
        percentOfAccount: params.percentage,
        maxCost: params.max_cost,
        lastTradeId: params.last_trade_id,
        collateralAmount: params.collateral_amount,
        merge: params.merge,
        managerData: params.manager_data.clone().into(),
    }
}

/// Read everything the bid depends on and size it at `now`
pub async fn plan_bid<C: ChainReader>(session: &Session<C>, options: &BidOptions, now: u64) -> Result<BidPlan> {
    let id = options.sub_account_id;
    let state = session
        .auction(id)
        .await
        .with_context(|| format!("reading auction {id}"))?;
    let params = session.auction_params().await?;
    let details = session.account_details(id, None).await?;

    let margin = details
        .margin
        .ok_or_else(|| anyhow!("margin of subaccount {id} is unknown (feeds stale), refusing to bid"))?;
    details.portfolio.ensure_complete(id)?;

    let request = BidRequest {
        sub_account_id: id,
        liquidator_sub_account_id: options.liquidator_sub_account_id,
        percentage: options.percentage,
        collateral_amount: options.collateral_amount,
        last_trade_id: options.last_trade_id.unwrap_or(details.last_trade_id),
        max_cost: options.max_cost,
        merge: options.merge,
        manager_data: Vec::new(),
    };

    Ok(size_bid(&request, &state, &margin, &params, now)?)
}

fn print_plan(plan: &BidPlan) {
    display::print_quote(&plan.quote);
    display::field("Cash required", display::prettify(plan.cash_required));
    display::field("Minimum collateral", display::prettify(plan.min_collateral));
    display::field("Collateral", display::format_amount(plan.params.collateral_amount));
    display::field("Percentage", display::format_amount(plan.params.percentage));
    display::field("Max cost", format_wad(plan.params.max_cost));
    display::field("Last trade id", plan.params.last_trade_id);
    display::field("Merge", plan.params.merge);
}

/// Size and, unless dry-running or no sender is given, submit the bid
pub async fn bid<C: ChainReader, S: TxSender>(
    session: &Session<C>,
    sender: Option<&S>,
    options: &BidOptions,
) -> Result<Option<Receipt>> {
    display::heading("Liquidation Bid");
    display::field("Subaccount", options.sub_account_id);
    display::field("Liquidator", options.liquidator_sub_account_id);

    let plan = plan_bid(session, options, now()).await?;
    println!();
    print_plan(&plan);

    let sender = match sender {
        Some(sender) if !options.dry_run => sender,
        _ => {
            println!("\n{}", "Dry run: bid not submitted".yellow());
            return Ok(None);
        }
    };

    let target = session.config.contracts.auction_utils;
    info!("Submitting {} on {} to {}", IAuctionUtils::advancedBidCall::SIGNATURE, options.sub_account_id, target);
    let receipt = sender
        .send(&Call::new(target, &advanced_bid_call(&plan.params)))
        .await
        .with_context(|| format!("bidding on subaccount {}", options.sub_account_id))?;

    println!("\n{} Bid submitted", "✓".green());
    display::field("Transaction", receipt.transaction_hash);
    if let Some(block) = receipt.block_number {
        display::field("Block", block);
    }
    Ok(Some(receipt))
}
