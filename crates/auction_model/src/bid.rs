//! Bid sizing
//!
//! Turns a liquidator's intent (which auction, what fraction, how much
//! collateral) into the exact argument set of `advancedBid`, checking the
//! collateral against what the auction will demand at `now`.

use alloy_primitives::{I256, U256};
use log::{info, warn};
use thiserror::Error;

use crate::auction::{
    bid_price, biddable_proportion, buffer_margin, phase, AccountMargin, AuctionParams, AuctionQuote,
    AuctionState, BidPrice, PricingError,
};
use crate::fixed::{format_wad, int, mul_div, wad};

/// Collateral added on top of the minimum when none is given
pub const DEFAULT_COLLATERAL_BUFFER: i128 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BidError {
    #[error("bid percentage {} must be in (0, 1]", format_wad(*.percentage))]
    InvalidPercentage { percentage: I256 },
    #[error(
        "insufficient collateral for subaccount {sub_account_id}: provided {}, required at least {}",
        format_wad(*.provided),
        format_wad(*.required)
    )]
    InsufficientCollateral {
        sub_account_id: U256,
        provided: I256,
        required: I256,
    },
    #[error("collateral amount {} is negative", format_wad(*.amount))]
    NegativeCollateral { amount: I256 },
    #[error("arithmetic overflow sizing bid for subaccount {sub_account_id}")]
    Overflow { sub_account_id: U256 },
    #[error(transparent)]
    Pricing(#[from] PricingError),
}

/// What the liquidator wants to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidRequest {
    pub sub_account_id: U256,
    pub liquidator_sub_account_id: U256,
    /// 18dp fraction of the account to take over
    pub percentage: I256,
    /// `None` picks the minimum plus [`DEFAULT_COLLATERAL_BUFFER`]
    pub collateral_amount: Option<I256>,
    pub last_trade_id: U256,
    pub max_cost: I256,
    pub merge: bool,
    /// Opaque manager data (feed attestations), passed through untouched
    pub manager_data: Vec<u8>,
}

/// Arguments of `advancedBid`, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidParams {
    pub worst_scenario: U256,
    pub sub_account_id: U256,
    pub liquidator_sub_account_id: U256,
    pub percentage: U256,
    pub max_cost: I256,
    pub last_trade_id: U256,
    pub collateral_amount: U256,
    pub merge: bool,
    pub manager_data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidPlan {
    pub cash_required: I256,
    pub min_collateral: I256,
    pub params: BidParams,
    pub quote: AuctionQuote,
}

pub fn size_bid(
    request: &BidRequest,
    state: &AuctionState,
    margin: &AccountMargin,
    params: &AuctionParams,
    now: u64,
) -> Result<BidPlan, BidError> {
    if request.percentage <= I256::ZERO || request.percentage > wad() {
        return Err(BidError::InvalidPercentage {
            percentage: request.percentage,
        });
    }

    let sub_account_id = request.sub_account_id;
    let BidPrice { price, discount } =
        bid_price(state, margin, params, now).map_err(|e| e.for_account(sub_account_id))?;
    let bm = buffer_margin(margin, params).map_err(|e| e.for_account(sub_account_id))?;
    let overflow = || BidError::Overflow { sub_account_id };

    let cash_required = price.checked_sub(bm).ok_or_else(overflow)?;
    let min_collateral = mul_div(cash_required, request.percentage, wad()).ok_or_else(overflow)?;

    let collateral = match request.collateral_amount {
        Some(amount) if amount.is_negative() => {
            return Err(BidError::NegativeCollateral { amount });
        }
        Some(amount) if amount < min_collateral => {
            return Err(BidError::InsufficientCollateral {
                sub_account_id: request.sub_account_id,
                provided: amount,
                required: min_collateral,
            });
        }
        Some(amount) => amount,
        None => {
            let buffer = int(DEFAULT_COLLATERAL_BUFFER) * wad();
            (min_collateral + buffer).max(I256::ZERO)
        }
    };

    // Only a warning: the contract clamps the percentage itself
    let max_proportion = biddable_proportion(state, margin, params, discount);
    if let Some(max) = max_proportion.filter(|max| request.percentage > *max) {
        warn!(
            "Bid on {} asks for {} of the account but at most {} is biddable now",
            request.sub_account_id,
            format_wad(request.percentage),
            format_wad(max)
        );
    }

    info!(
        "Sized bid on {}: cash required {}, minimum collateral {}, collateral {}",
        request.sub_account_id,
        format_wad(cash_required),
        format_wad(min_collateral),
        format_wad(collateral)
    );

    Ok(BidPlan {
        cash_required,
        min_collateral,
        params: BidParams {
            worst_scenario: margin.worst_scenario,
            sub_account_id: request.sub_account_id,
            liquidator_sub_account_id: request.liquidator_sub_account_id,
            percentage: request.percentage.into_raw(),
            max_cost: request.max_cost,
            last_trade_id: request.last_trade_id,
            collateral_amount: collateral.into_raw(),
            merge: request.merge,
            manager_data: request.manager_data.clone(),
        },
        quote: AuctionQuote {
            phase: phase(state, params, now),
            price,
            discount,
            buffer_margin: bm,
            max_proportion,
        },
    })
}
