//! Auction Model - Liquidation auction pricing and portfolio decoding
//!
//! This crate holds the client-side replica of the on-chain liquidation math:
//! the solvent/insolvent discount curves, buffer margin, bid price and
//! maximum biddable proportion, plus the decoding of raw subaccount balances
//! into a structured portfolio.
//!
//! Everything here is pure: callers pass in chain state and the current unix
//! time, nothing is fetched. All amounts are 18-decimal fixed-point `I256`
//! values and every division truncates toward zero, exactly like the EVM.

#![forbid(unsafe_code)]

pub mod auction;
pub mod bid;
pub mod directory;
pub mod fixed;
pub mod portfolio;
pub mod subid;

pub use alloy_primitives::{Address, I256, U256};

pub use auction::{
    bid_price, biddable_proportion, buffer_margin, discount_percentage, max_proportion, phase, quote,
    AccountMargin, AuctionParams, AuctionPhase, AuctionQuote, AuctionState, BidPrice, PricingError,
};
pub use bid::{size_bid, BidError, BidParams, BidPlan, BidRequest};
pub use directory::{AssetDirectory, AssetKind, DirectoryError, MarketAssets, MarketRole};
pub use fixed::{abs, format_fixed, parse_fixed, FixedError};
pub use portfolio::{
    classify_balances, AccountDetails, AccountPortfolio, MarketPosition, PerpPnlRequest,
    PerpPosition, PortfolioDraft, PortfolioError, RawBalance,
};
pub use subid::{OptionDetails, SubIdError};

/// Decimal places of every protocol amount (cash, margin, percentages)
pub const DECIMALS: u8 = 18;

/// Decimal places of the USDC stable asset backing cash deposits
pub const USDC_DECIMALS: u8 = 6;
