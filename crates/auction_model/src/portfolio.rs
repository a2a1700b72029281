//! Subaccount portfolio decoding
//!
//! Raw balances come back from the subaccounts contract as a flat list of
//! `(asset, subId, amount)`. Building a portfolio is two steps:
//!
//! 1. [`classify_balances`] sorts every record into cash, base, perp or
//!    option buckets and queues one unrealized-PnL read per perp held.
//! 2. The caller runs the queued reads as a single batch and hands the
//!    results to [`PortfolioDraft::finish`], which attaches them in queue order.
//!
//! Records whose asset is not in the directory are kept aside in
//! [`AccountPortfolio::unknown`] so nothing disappears silently.

use alloy_primitives::{Address, I256, U256};
use log::warn;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::auction::AccountMargin;
use crate::directory::{AssetDirectory, AssetKind, MarketRole};
use crate::subid::OptionDetails;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortfolioError {
    #[error("subaccount {sub_account_id}: expected {expected} perp PnL results, got {got}")]
    PnlCountMismatch {
        sub_account_id: U256,
        expected: usize,
        got: usize,
    },
    #[error("subaccount {sub_account_id} holds {} unknown asset(s): {}", .assets.len(), list_assets(.assets))]
    UnknownAssets {
        sub_account_id: U256,
        assets: Vec<RawBalance>,
    },
}

fn list_assets(assets: &[RawBalance]) -> String {
    assets
        .iter()
        .map(|b| format!("{} (subId {})", b.asset, b.sub_id))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One entry of `getAccountBalances`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBalance {
    pub asset: Address,
    pub sub_id: U256,
    pub amount: I256,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerpPosition {
    pub position: I256,
    pub unrealized_pnl: I256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketPosition {
    pub base: I256,
    pub perp: PerpPosition,
    pub options: BTreeMap<OptionDetails, I256>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountPortfolio {
    pub cash: I256,
    pub markets: BTreeMap<String, MarketPosition>,
    /// Balances whose asset matched nothing in the directory
    pub unknown: Vec<RawBalance>,
}

impl AccountPortfolio {
    pub fn is_complete(&self) -> bool {
        self.unknown.is_empty()
    }

    /// Fail if any balance could not be classified
    pub fn ensure_complete(&self, sub_account_id: U256) -> Result<(), PortfolioError> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(PortfolioError::UnknownAssets {
                sub_account_id,
                assets: self.unknown.clone(),
            })
        }
    }

    /// Number of non-zero positions across all buckets (unknown excluded)
    pub fn position_count(&self) -> usize {
        let cash = usize::from(!self.cash.is_zero());
        let markets: usize = self
            .markets
            .values()
            .map(|m| {
                usize::from(!m.base.is_zero())
                    + usize::from(!m.perp.position.is_zero())
                    + m.options.values().filter(|a| !a.is_zero()).count()
            })
            .sum();
        cash + markets
    }
}

/// Everything known about a subaccount at one block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDetails {
    pub sub_account_id: U256,
    pub last_trade_id: U256,
    /// `None` when margin could not be computed (stale feeds), never zero
    pub margin: Option<AccountMargin>,
    pub portfolio: AccountPortfolio,
}

/// A perp whose unrealized PnL still has to be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerpPnlRequest {
    pub currency: String,
    pub perp: Address,
}

/// Portfolio with perp PnL reads still outstanding
#[derive(Debug, Clone)]
pub struct PortfolioDraft {
    sub_account_id: U256,
    portfolio: AccountPortfolio,
    pending: Vec<PerpPnlRequest>,
}

impl PortfolioDraft {
    pub fn sub_account_id(&self) -> U256 {
        self.sub_account_id
    }

    /// Queued reads, in the order results must be supplied
    pub fn pnl_requests(&self) -> &[PerpPnlRequest] {
        &self.pending
    }

    /// Attach `getUnsettledAndUnrealizedCash` results, one per queued request
    pub fn finish(mut self, pnls: Vec<I256>) -> Result<AccountPortfolio, PortfolioError> {
        if pnls.len() != self.pending.len() {
            return Err(PortfolioError::PnlCountMismatch {
                sub_account_id: self.sub_account_id,
                expected: self.pending.len(),
                got: pnls.len(),
            });
        }

        for (request, pnl) in self.pending.iter().zip(pnls) {
            let market = self.portfolio.markets.entry(request.currency.clone()).or_default();
            market.perp.unrealized_pnl = pnl;
        }

        Ok(self.portfolio)
    }
}

/// Sort raw balances into portfolio buckets.
///
/// A bucket seen twice accumulates rather than overwrites, but each perp's
/// unrealized PnL is queued only once. Option ids with
/// bits set above the call flag do not survive a decode/encode round trip and
/// are treated as unknown.
pub fn classify_balances(
    sub_account_id: U256,
    balances: &[RawBalance],
    directory: &AssetDirectory,
) -> PortfolioDraft {
    let mut portfolio = AccountPortfolio::default();
    let mut pending = Vec::new();

    for balance in balances {
        let kind = match directory.classify(&balance.asset) {
            Some(kind) => kind,
            None => {
                warn!(
                    "Unknown asset {} (subId {}) in subaccount {}",
                    balance.asset, balance.sub_id, sub_account_id
                );
                portfolio.unknown.push(balance.clone());
                continue;
            }
        };

        match kind {
            AssetKind::Cash => {
                portfolio.cash += balance.amount;
            }
            AssetKind::Market { currency, role } => match role {
                MarketRole::Base => {
                    portfolio.markets.entry(currency.clone()).or_default().base += balance.amount;
                }
                MarketRole::Perp => {
                    portfolio
                        .markets
                        .entry(currency.clone())
                        .or_default()
                        .perp
                        .position += balance.amount;
                    // PnL is an account-level figure per perp: read it once
                    if !pending.iter().any(|r: &PerpPnlRequest| r.perp == balance.asset) {
                        pending.push(PerpPnlRequest {
                            currency: currency.clone(),
                            perp: balance.asset,
                        });
                    }
                }
                MarketRole::Option => {
                    let details = OptionDetails::decode(balance.sub_id);
                    if details.encode().ok() != Some(balance.sub_id) {
                        warn!(
                            "Non-canonical option subId {} for {} in subaccount {}",
                            balance.sub_id, currency, sub_account_id
                        );
                        portfolio.unknown.push(balance.clone());
                        continue;
                    }
                    *portfolio
                        .markets
                        .entry(currency.clone())
                        .or_default()
                        .options
                        .entry(details)
                        .or_insert(I256::ZERO) += balance.amount;
                }
            },
        }
    }

    PortfolioDraft {
        sub_account_id,
        portfolio,
        pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::MarketAssets;
    use crate::fixed::parse_wad;
    use alloy_primitives::address;

    const CASH: Address = address!("c000000000000000000000000000000000000001");
    const ETH_BASE: Address = address!("e000000000000000000000000000000000000001");
    const ETH_PERP: Address = address!("e000000000000000000000000000000000000002");
    const ETH_OPTION: Address = address!("e000000000000000000000000000000000000003");
    const BTC_PERP: Address = address!("b000000000000000000000000000000000000002");

    fn directory() -> AssetDirectory {
        AssetDirectory::new(
            CASH,
            [
                (
                    "ETH".to_string(),
                    MarketAssets {
                        base: Some(ETH_BASE),
                        perp: Some(ETH_PERP),
                        option: Some(ETH_OPTION),
                    },
                ),
                (
                    "BTC".to_string(),
                    MarketAssets {
                        base: None,
                        perp: Some(BTC_PERP),
                        option: None,
                    },
                ),
            ],
        )
        .unwrap()
    }

    fn bal(asset: Address, sub_id: U256, amount: &str) -> RawBalance {
        RawBalance {
            asset,
            sub_id,
            amount: parse_wad(amount).unwrap(),
        }
    }

    #[test]
    fn test_classify_all_buckets() {
        let option = OptionDetails {
            expiry: 1_711_699_200,
            strike: 3_000_000_000_000_000_000_000,
            is_call: true,
        };
        let balances = vec![
            bal(CASH, U256::ZERO, "1500"),
            bal(ETH_BASE, U256::ZERO, "2"),
            bal(ETH_PERP, U256::ZERO, "-3"),
            bal(ETH_OPTION, option.encode().unwrap(), "-1.5"),
            bal(BTC_PERP, U256::ZERO, "0.25"),
        ];

        let draft = classify_balances(U256::from(7u64), &balances, &directory());
        let requests: Vec<_> = draft.pnl_requests().iter().map(|r| r.currency.as_str()).collect();
        assert_eq!(requests, vec!["ETH", "BTC"]);

        let portfolio = draft
            .finish(vec![parse_wad("-10").unwrap(), parse_wad("4").unwrap()])
            .unwrap();

        assert_eq!(portfolio.cash, parse_wad("1500").unwrap());
        let eth = &portfolio.markets["ETH"];
        assert_eq!(eth.base, parse_wad("2").unwrap());
        assert_eq!(eth.perp.position, parse_wad("-3").unwrap());
        assert_eq!(eth.perp.unrealized_pnl, parse_wad("-10").unwrap());
        assert_eq!(eth.options[&option], parse_wad("-1.5").unwrap());
        let btc = &portfolio.markets["BTC"];
        assert_eq!(btc.perp.unrealized_pnl, parse_wad("4").unwrap());
        assert!(portfolio.is_complete());
        assert_eq!(portfolio.position_count(), 5);
    }

    #[test]
    fn test_unknown_asset_is_kept_aside() {
        let stray = address!("dead00000000000000000000000000000000beef");
        let balances = vec![bal(CASH, U256::ZERO, "10"), bal(stray, U256::from(3u64), "99")];

        let draft = classify_balances(U256::from(1u64), &balances, &directory());
        assert!(draft.pnl_requests().is_empty());
        let portfolio = draft.finish(vec![]).unwrap();

        assert_eq!(portfolio.cash, parse_wad("10").unwrap());
        assert!(portfolio.markets.is_empty());
        assert_eq!(portfolio.unknown.len(), 1);
        assert_eq!(portfolio.unknown[0].asset, stray);

        let err = portfolio.ensure_complete(U256::from(1u64)).unwrap_err();
        assert!(matches!(err, PortfolioError::UnknownAssets { ref assets, .. } if assets.len() == 1));
    }

    #[test]
    fn test_non_canonical_option_id_is_unknown() {
        let id = (U256::from(1u64) << 100usize) | U256::from(5u64);
        let draft = classify_balances(U256::from(1u64), &[bal(ETH_OPTION, id, "1")], &directory());
        let portfolio = draft.finish(vec![]).unwrap();
        assert!(portfolio.markets.is_empty());
        assert_eq!(portfolio.unknown.len(), 1);
    }

    #[test]
    fn test_duplicate_cash_records_are_summed() {
        let balances = vec![bal(CASH, U256::ZERO, "10"), bal(CASH, U256::ZERO, "2.5")];
        let portfolio = classify_balances(U256::from(1u64), &balances, &directory())
            .finish(vec![])
            .unwrap();
        assert_eq!(portfolio.cash, parse_wad("12.5").unwrap());
    }

    #[test]
    fn test_duplicate_perp_records_read_pnl_once() {
        let balances = vec![bal(ETH_PERP, U256::ZERO, "1"), bal(ETH_PERP, U256::ZERO, "2")];
        let draft = classify_balances(U256::from(4u64), &balances, &directory());
        assert_eq!(draft.pnl_requests().len(), 1);

        let portfolio = draft.finish(vec![parse_wad("-7").unwrap()]).unwrap();
        let eth = &portfolio.markets["ETH"];
        assert_eq!(eth.perp.position, parse_wad("3").unwrap());
        assert_eq!(eth.perp.unrealized_pnl, parse_wad("-7").unwrap());
    }

    #[test]
    fn test_pnl_count_mismatch() {
        let balances = vec![bal(ETH_PERP, U256::ZERO, "1")];
        let draft = classify_balances(U256::from(9u64), &balances, &directory());
        assert_eq!(
            draft.finish(vec![]),
            Err(PortfolioError::PnlCountMismatch {
                sub_account_id: U256::from(9u64),
                expected: 1,
                got: 0
            })
        );
    }
}
