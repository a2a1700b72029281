//! Liquidation auction pricing
//!
//! Client-side replica of the auction contract's pricing. Nothing is stored:
//! every figure is recomputed from the auction snapshot, the account margin
//! and the current unix time.
//!
//! Solvent auctions price the account at a discount of its buffer margin
//! that decays in two linear phases:
//!
//! ```text
//! discount
//!   start ┐
//!         │╲            fast phase
//!  cutoff ┤ ╲_______
//!         │         ╲_______     slow phase
//!       0 ┼─────────────────╲______________
//!         0     fast     fast+slow      elapsed
//! ```
//!
//! Insolvent auctions instead ramp the price the protocol pays the bidder
//! from zero up to the full maintenance margin over `insolvent_auction_length`.

use alloy_primitives::{I256, U256};
use log::{debug, warn};
use std::fmt;
use thiserror::Error;

use crate::fixed::{format_wad, mul_div, seconds, wad};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("invalid auction params: {0}")]
    InvalidParams(&'static str),
    #[error("auction for subaccount {sub_account_id} is not ongoing")]
    NotOngoing { sub_account_id: U256 },
    #[error(
        "max proportion undefined: denominator is zero (buffer margin {}, discount {})",
        format_wad(*.buffer_margin),
        format_wad(*.discount)
    )]
    ZeroDenominator { buffer_margin: I256, discount: I256 },
    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),
    #[error("subaccount {sub_account_id}: {source}")]
    Account {
        sub_account_id: U256,
        #[source]
        source: Box<PricingError>,
    },
}

impl PricingError {
    pub(crate) fn for_account(self, sub_account_id: U256) -> Self {
        match self {
            PricingError::NotOngoing { .. } | PricingError::Account { .. } => self,
            other => PricingError::Account {
                sub_account_id,
                source: Box::new(other),
            },
        }
    }
}

/// Snapshot of `getAuction(accountId)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionState {
    pub sub_account_id: U256,
    pub ongoing: bool,
    /// Fixed when the auction starts
    pub insolvent: bool,
    pub cached_scenario_id: U256,
    /// Unix seconds
    pub start_time: u64,
    pub reserved_cash: I256,
}

/// Protocol-wide auction configuration (`getAuctionParams()`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionParams {
    pub starting_mtm_percentage: I256,
    pub fast_auction_cutoff_percentage: I256,
    pub fast_auction_length: u64,
    pub slow_auction_length: u64,
    pub insolvent_auction_length: u64,
    pub liquidator_fee_rate: I256,
    pub buffer_margin_percentage: I256,
}

impl AuctionParams {
    pub fn validate(&self) -> Result<(), PricingError> {
        if self.fast_auction_cutoff_percentage < I256::ZERO {
            return Err(PricingError::InvalidParams("fast auction cutoff is negative"));
        }
        if self.starting_mtm_percentage < self.fast_auction_cutoff_percentage {
            return Err(PricingError::InvalidParams(
                "starting MtM percentage is below the fast auction cutoff",
            ));
        }
        if self.fast_auction_length == 0
            || self.slow_auction_length == 0
            || self.insolvent_auction_length == 0
        {
            return Err(PricingError::InvalidParams("auction lengths must be non-zero"));
        }
        Ok(())
    }
}

/// Result of `getMM(accountId)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountMargin {
    pub mm: I256,
    pub mtm: I256,
    pub worst_scenario: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuctionPhase {
    /// Ongoing, but the local clock is behind the auction start
    NotStarted,
    Solvent,
    Insolvent,
    Ended,
}

impl fmt::Display for AuctionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AuctionPhase::NotStarted => "not started",
            AuctionPhase::Solvent => "solvent",
            AuctionPhase::Insolvent => "insolvent",
            AuctionPhase::Ended => "ended",
        };
        f.write_str(label)
    }
}

pub fn phase(state: &AuctionState, params: &AuctionParams, now: u64) -> AuctionPhase {
    if !state.ongoing {
        return AuctionPhase::Ended;
    }
    if now < state.start_time {
        return AuctionPhase::NotStarted;
    }
    let elapsed = now - state.start_time;
    if state.insolvent {
        if elapsed > params.insolvent_auction_length {
            AuctionPhase::Ended
        } else {
            AuctionPhase::Insolvent
        }
    } else {
        AuctionPhase::Solvent
    }
}

/// Solvent-auction discount applied to the buffer margin (18dp fraction)
pub fn discount_percentage(
    start_time: u64,
    now: u64,
    params: &AuctionParams,
) -> Result<I256, PricingError> {
    params.validate()?;
    let elapsed = now.saturating_sub(start_time);

    if elapsed < params.fast_auction_length {
        let total_change = params.starting_mtm_percentage - params.fast_auction_cutoff_percentage;
        let decayed = mul_div(
            total_change,
            seconds(elapsed),
            seconds(params.fast_auction_length),
        )
        .ok_or(PricingError::Overflow("fast auction discount"))?;
        Ok(params.starting_mtm_percentage - decayed)
    } else if elapsed >= params.fast_auction_length.saturating_add(params.slow_auction_length) {
        Ok(I256::ZERO)
    } else {
        let elapsed_in_slow = elapsed - params.fast_auction_length;
        let decayed = mul_div(
            params.fast_auction_cutoff_percentage,
            seconds(elapsed_in_slow),
            seconds(params.slow_auction_length),
        )
        .ok_or(PricingError::Overflow("slow auction discount"))?;
        Ok(params.fast_auction_cutoff_percentage - decayed)
    }
}

/// `MM + (MM - MtM) * bufferMarginPercentage`
pub fn buffer_margin(margin: &AccountMargin, params: &AuctionParams) -> Result<I256, PricingError> {
    let buffer = mul_div(margin.mm - margin.mtm, params.buffer_margin_percentage, wad())
        .ok_or(PricingError::Overflow("buffer margin"))?;
    Ok(margin.mm + buffer)
}

/// Price and signed discount at `now`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BidPrice {
    pub price: I256,
    /// Non-negative for solvent auctions. Negative for insolvent ones, with
    /// `-1` meaning the insolvent auction has run its full length.
    pub discount: I256,
}

pub fn bid_price(
    state: &AuctionState,
    margin: &AccountMargin,
    params: &AuctionParams,
    now: u64,
) -> Result<BidPrice, PricingError> {
    if !state.ongoing {
        return Err(PricingError::NotOngoing {
            sub_account_id: state.sub_account_id,
        });
    }
    params.validate()?;

    if now < state.start_time {
        debug!(
            "Auction {} starts at {}, local time is {}; pricing at elapsed 0",
            state.sub_account_id, state.start_time, now
        );
    }
    let elapsed = now.saturating_sub(state.start_time);

    if state.insolvent {
        if elapsed > params.insolvent_auction_length {
            return Ok(BidPrice {
                price: margin.mm,
                discount: -wad(),
            });
        }

        // MtM is capped at zero: a positive MtM never reduces what is paid out
        let capped_mtm = margin.mtm.min(I256::ZERO);
        let length = seconds(params.insolvent_auction_length);
        let price = mul_div(margin.mm - capped_mtm, seconds(elapsed), length)
            .ok_or(PricingError::Overflow("insolvent bid price"))?;
        let progress = mul_div(seconds(elapsed), wad(), length)
            .ok_or(PricingError::Overflow("insolvent discount"))?;

        Ok(BidPrice {
            price,
            discount: -progress,
        })
    } else {
        let bm = buffer_margin(margin, params)?;
        let discount = discount_percentage(state.start_time, now, params)?;
        let price = mul_div(bm - state.reserved_cash, discount, wad())
            .ok_or(PricingError::Overflow("solvent bid price"))?;

        Ok(BidPrice { price, discount })
    }
}

/// Largest fraction of a solvent account that can be bid on at `discount`.
///
/// A positive buffer margin returns 1 outright. That matches the contract even
/// though it lets a seemingly healthy account be bid on in full.
pub fn max_proportion(
    margin: &AccountMargin,
    params: &AuctionParams,
    discount: I256,
) -> Result<I256, PricingError> {
    let bm = buffer_margin(margin, params)?;
    if bm > I256::ZERO {
        return Ok(wad());
    }

    let mtm_part = mul_div(margin.mtm, discount, wad())
        .ok_or(PricingError::Overflow("max proportion"))?;
    let loss_part = mul_div(margin.mm - margin.mtm, wad() - discount, wad())
        .ok_or(PricingError::Overflow("max proportion"))?;
    let denominator = bm - mtm_part - loss_part;

    if denominator.is_zero() {
        return Err(PricingError::ZeroDenominator {
            buffer_margin: bm,
            discount,
        });
    }

    mul_div(bm, wad(), denominator).ok_or(PricingError::Overflow("max proportion"))
}

/// Biddable fraction at `discount`: all of an insolvent account, `None` when
/// the solvent formula is undefined. Failures are logged, never raised, since
/// the figure only informs the operator.
pub fn biddable_proportion(
    state: &AuctionState,
    margin: &AccountMargin,
    params: &AuctionParams,
    discount: I256,
) -> Option<I256> {
    if state.insolvent {
        return Some(wad());
    }
    match max_proportion(margin, params, discount) {
        Ok(proportion) => Some(proportion),
        Err(e) => {
            warn!("Max proportion of {} unavailable: {}", state.sub_account_id, e);
            None
        }
    }
}

/// Everything needed to decide on a bid, at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuctionQuote {
    pub phase: AuctionPhase,
    pub price: I256,
    pub discount: I256,
    pub buffer_margin: I256,
    pub max_proportion: Option<I256>,
}

pub fn quote(
    state: &AuctionState,
    margin: &AccountMargin,
    params: &AuctionParams,
    now: u64,
) -> Result<AuctionQuote, PricingError> {
    let sub_account_id = state.sub_account_id;
    let BidPrice { price, discount } =
        bid_price(state, margin, params, now).map_err(|e| e.for_account(sub_account_id))?;
    let bm = buffer_margin(margin, params).map_err(|e| e.for_account(sub_account_id))?;

    Ok(AuctionQuote {
        phase: phase(state, params, now),
        price,
        discount,
        buffer_margin: bm,
        max_proportion: biddable_proportion(state, margin, params, discount),
    })
}
