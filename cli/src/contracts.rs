//! Typed contract reads and the read paths built on them
//!
//! Calls and events come from the `sol!` bindings; this module turns their
//! raw returns into `auction_model` types and groups the reads every command
//! needs behind [`Session`].

use alloy_primitives::{Address, B256, I256, U256};
use alloy_sol_types::{SolCall, SolEvent};
use anyhow::{anyhow, Context, Result};
use auction_model::{
    classify_balances, AccountDetails, AccountMargin, AccountPortfolio, AssetDirectory,
    AuctionParams, AuctionState, MarketAssets, RawBalance,
};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};

use crate::bindings::{
    IAuctionUtils, IDutchAuction, IDutchAuctionTestnet, IManager, IPerpAsset, ISpotFeed,
    ISubAccounts,
};
use crate::client::{Call, ChainReader, LogFilter, ReadOptions};
use crate::config::{AuctionLayout, Config};

pub use crate::bindings::IDutchAuction::{
    AuctionEnded, Bid as BidPlaced, InsolventAuctionStarted, SolventAuctionStarted,
};
pub use crate::bindings::ISecurityModule::SecurityModulePaidOut;

fn to_u64(value: U256, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} {value} does not fit in 64 bits"))
}

/// Reinterpret a uint256 that is known to be a non-negative int256
fn to_i256(value: U256, field: &str) -> Result<I256> {
    I256::try_from(value).map_err(|_| anyhow!("{field} {value} exceeds int256"))
}

pub fn auction_params(raw: IDutchAuction::AuctionParams) -> Result<AuctionParams> {
    Ok(AuctionParams {
        starting_mtm_percentage: to_i256(raw.startingMtMPercentage, "startingMtMPercentage")?,
        fast_auction_cutoff_percentage: to_i256(
            raw.fastAuctionCutoffPercentage,
            "fastAuctionCutoffPercentage",
        )?,
        fast_auction_length: to_u64(raw.fastAuctionLength, "fastAuctionLength")?,
        slow_auction_length: to_u64(raw.slowAuctionLength, "slowAuctionLength")?,
        insolvent_auction_length: to_u64(raw.insolventAuctionLength, "insolventAuctionLength")?,
        liquidator_fee_rate: to_i256(raw.liquidatorFeeRate, "liquidatorFeeRate")?,
        buffer_margin_percentage: to_i256(raw.bufferMarginPercentage, "bufferMarginPercentage")?,
    })
}

pub fn auction_state(sub_account_id: U256, raw: IDutchAuction::Auction) -> Result<AuctionState> {
    Ok(AuctionState {
        sub_account_id,
        ongoing: raw.ongoing,
        insolvent: raw.insolvent,
        cached_scenario_id: raw.scenarioId,
        start_time: to_u64(raw.startTime, "startTime")?,
        reserved_cash: raw.reservedCash,
    })
}

impl From<IDutchAuctionTestnet::Auction> for IDutchAuction::Auction {
    fn from(raw: IDutchAuctionTestnet::Auction) -> Self {
        Self {
            accountId: raw.accountId,
            scenarioId: raw.scenarioId,
            insolvent: raw.insolvent,
            ongoing: raw.ongoing,
            cachedMM: raw.cachedMM,
            startTime: raw.startTime,
            reservedCash: raw.reservedCash,
        }
    }
}

pub async fn read<C: SolCall>(
    chain: &impl ChainReader,
    target: Address,
    call: &C,
    options: &ReadOptions,
) -> Result<C::Return> {
    let data = chain
        .call(&Call::new(target, call), options)
        .await
        .with_context(|| format!("{} on {}", C::SIGNATURE, target))?;
    C::abi_decode_returns(&data, true)
        .with_context(|| format!("decoding {} from {}", C::SIGNATURE, target))
}

/// One multicall over `requests`; failed slots are `None` when partial failure is allowed
pub async fn read_many<C: SolCall>(
    chain: &impl ChainReader,
    requests: &[(Address, C)],
    options: &ReadOptions,
    allow_partial_failure: bool,
) -> Result<Vec<Option<C::Return>>> {
    let calls: Vec<Call> = requests.iter().map(|(target, c)| Call::new(*target, c)).collect();
    let results = chain
        .multicall(&calls, options, allow_partial_failure)
        .await
        .with_context(|| format!("multicall of {} x {}", calls.len(), C::SIGNATURE))?;

    results
        .into_iter()
        .zip(requests)
        .map(|(slot, (target, _))| match slot {
            None => Ok(None),
            Some(data) => match C::abi_decode_returns(&data, true) {
                Ok(output) => Ok(Some(output)),
                Err(e) if allow_partial_failure => {
                    warn!("Dropping {} result from {}: {}", C::SIGNATURE, target, e);
                    Ok(None)
                }
                Err(e) => Err(anyhow!(e).context(format!("decoding {} from {}", C::SIGNATURE, target))),
            },
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logged<E> {
    pub event: E,
    pub block_number: u64,
    pub transaction_hash: B256,
}

pub async fn fetch_events<E: SolEvent>(
    chain: &impl ChainReader,
    address: Address,
    from_block: u64,
    to_block: Option<u64>,
) -> Result<Vec<Logged<E>>> {
    let filter = LogFilter::new::<E>(address, from_block, to_block);
    let logs = chain
        .get_logs(&filter)
        .await
        .with_context(|| format!("fetching {} logs from {}", E::SIGNATURE, address))?;

    logs.into_iter()
        .filter(|log| log.topics.first() == Some(&E::SIGNATURE_HASH))
        .map(|log| {
            let event = E::decode_raw_log(log.topics.iter().copied(), &log.data, true)?;
            Ok(Logged {
                event,
                block_number: log.block_number,
                transaction_hash: log.transaction_hash,
            })
        })
        .collect::<Result<Vec<_>, alloy_sol_types::Error>>()
        .with_context(|| format!("decoding {} logs", E::SIGNATURE))
}

/// Market addresses a manager contract can fill in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ManagerGetter {
    Perp,
    Option,
    SpotFeed,
}

impl ManagerGetter {
    fn call(self, manager: Address) -> Call {
        match self {
            ManagerGetter::Perp => Call::new(manager, &IManager::perpCall {}),
            ManagerGetter::Option => Call::new(manager, &IManager::optionCall {}),
            ManagerGetter::SpotFeed => Call::new(manager, &IManager::spotFeedCall {}),
        }
    }

    fn decode(self, data: &[u8]) -> Result<Address, alloy_sol_types::Error> {
        match self {
            ManagerGetter::Perp => IManager::perpCall::abi_decode_returns(data, true).map(|r| r._0),
            ManagerGetter::Option => IManager::optionCall::abi_decode_returns(data, true).map(|r| r._0),
            ManagerGetter::SpotFeed => {
                IManager::spotFeedCall::abi_decode_returns(data, true).map(|r| r._0)
            }
        }
    }

    fn label(self) -> &'static str {
        match self {
            ManagerGetter::Perp => "perp",
            ManagerGetter::Option => "option",
            ManagerGetter::SpotFeed => "spot feed",
        }
    }
}

/// Asset directory plus the per-market spot feeds, resolved once at startup
#[derive(Debug, Clone)]
pub struct Deployment {
    pub directory: AssetDirectory,
    pub spot_feeds: BTreeMap<String, Address>,
}

/// Everything a command needs to read the exchange
pub struct Session<C> {
    pub chain: C,
    pub config: Config,
    pub deployment: Deployment,
}

/// Build the asset directory, filling addresses the config leaves out from
/// each market's manager contract in a single multicall.
pub async fn resolve_deployment(chain: &impl ChainReader, config: &Config) -> Result<Deployment> {
    let mut lookups: Vec<(String, ManagerGetter, Address)> = Vec::new();
    for (currency, market) in &config.markets {
        let Some(manager) = market.manager else {
            continue;
        };
        let missing = [
            (ManagerGetter::Perp, market.perp.is_none()),
            (ManagerGetter::Option, market.option.is_none()),
            (ManagerGetter::SpotFeed, market.spot_feed.is_none()),
        ];
        for (getter, _) in missing.into_iter().filter(|(_, missing)| *missing) {
            lookups.push((currency.clone(), getter, manager));
        }
    }

    let mut resolved: BTreeMap<(String, ManagerGetter), Address> = BTreeMap::new();
    if !lookups.is_empty() {
        debug!("Resolving {} market addresses from managers", lookups.len());
        let calls: Vec<Call> = lookups.iter().map(|(_, getter, manager)| getter.call(*manager)).collect();
        let results = chain
            .multicall(&calls, &ReadOptions::default(), true)
            .await
            .context("resolving market addresses from managers")?;

        for ((currency, getter, _), slot) in lookups.into_iter().zip(results) {
            let address = slot
                .map(|data| getter.decode(&data))
                .transpose()
                .with_context(|| format!("decoding {} address of {}", getter.label(), currency))?
                .filter(|address| *address != Address::ZERO);
            match address {
                Some(address) => {
                    resolved.insert((currency, getter), address);
                }
                None => debug!("Market {} has no {} on its manager", currency, getter.label()),
            }
        }
    }

    let mut markets = Vec::new();
    let mut spot_feeds = BTreeMap::new();
    for (currency, market) in &config.markets {
        let lookup = |getter| resolved.get(&(currency.clone(), getter)).copied();
        markets.push((
            currency.clone(),
            MarketAssets {
                base: market.base,
                perp: market.perp.or_else(|| lookup(ManagerGetter::Perp)),
                option: market.option.or_else(|| lookup(ManagerGetter::Option)),
            },
        ));
        if let Some(feed) = market.spot_feed.or_else(|| lookup(ManagerGetter::SpotFeed)) {
            spot_feeds.insert(currency.clone(), feed);
        }
    }

    let directory = AssetDirectory::new(config.contracts.cash, markets)?;
    Ok(Deployment {
        directory,
        spot_feeds,
    })
}

impl<C: ChainReader> Session<C> {
    pub async fn connect(chain: C, config: Config) -> Result<Self> {
        let deployment = resolve_deployment(&chain, &config).await?;
        Ok(Self {
            chain,
            config,
            deployment,
        })
    }

    pub async fn auction_params(&self) -> Result<AuctionParams> {
        let raw = read(
            &self.chain,
            self.config.contracts.auction,
            &IDutchAuction::getAuctionParamsCall {},
            &ReadOptions::default(),
        )
        .await?;
        auction_params(raw._0)
    }

    pub async fn auction(&self, sub_account_id: U256) -> Result<AuctionState> {
        let target = self.config.contracts.auction;
        let options = ReadOptions::default();
        let raw = match self.config.auction_layout {
            AuctionLayout::Standard => {
                let call = IDutchAuction::getAuctionCall {
                    accountId: sub_account_id,
                };
                read(&self.chain, target, &call, &options).await?._0
            }
            AuctionLayout::WithPercentageLeft => {
                let call = IDutchAuctionTestnet::getAuctionCall {
                    accountId: sub_account_id,
                };
                read(&self.chain, target, &call, &options).await?._0.into()
            }
        };
        auction_state(sub_account_id, raw)
    }

    /// Margin reads commonly fail on stale feeds, so they are never retried
    pub async fn margin(&self, sub_account_id: U256, block: Option<u64>) -> Result<AccountMargin> {
        let options = ReadOptions::at(block).with_retries(0);
        let call = IAuctionUtils::getMMCall {
            accountId: sub_account_id,
        };
        let raw = read(&self.chain, self.config.margin_contract(block), &call, &options).await?;
        Ok(AccountMargin {
            mm: raw.maintenanceMargin,
            mtm: raw.markToMarket,
            worst_scenario: raw.worstScenario,
        })
    }

    pub async fn last_trade_id(&self, sub_account_id: U256, block: Option<u64>) -> Result<U256> {
        let call = ISubAccounts::lastAccountTradeIdCall {
            accountId: sub_account_id,
        };
        let raw = read(&self.chain, self.config.contracts.subaccounts, &call, &ReadOptions::at(block)).await?;
        Ok(raw._0)
    }

    /// Balances plus one multicall for every held perp's unrealized PnL
    pub async fn portfolio(&self, sub_account_id: U256, block: Option<u64>) -> Result<AccountPortfolio> {
        let options = ReadOptions::at(block);
        let call = ISubAccounts::getAccountBalancesCall {
            accountId: sub_account_id,
        };
        let balances: Vec<RawBalance> = read(&self.chain, self.config.contracts.subaccounts, &call, &options)
            .await?
            ._0
            .into_iter()
            .map(|b| RawBalance {
                asset: b.asset,
                sub_id: b.subId,
                amount: b.balance,
            })
            .collect();

        let draft = classify_balances(sub_account_id, &balances, &self.deployment.directory);
        let requests: Vec<(Address, IPerpAsset::getUnsettledAndUnrealizedCashCall)> = draft
            .pnl_requests()
            .iter()
            .map(|r| {
                (
                    r.perp,
                    IPerpAsset::getUnsettledAndUnrealizedCashCall {
                        accountId: sub_account_id,
                    },
                )
            })
            .collect();

        let pnls = if requests.is_empty() {
            Vec::new()
        } else {
            read_many(&self.chain, &requests, &options, false)
                .await?
                .into_iter()
                .map(|pnl| {
                    pnl.map(|r| r._0)
                        .ok_or_else(|| anyhow!("missing perp PnL for {}", sub_account_id))
                })
                .collect::<Result<Vec<_>>>()?
        };

        Ok(draft.finish(pnls)?)
    }

    pub async fn account_details(&self, sub_account_id: U256, block: Option<u64>) -> Result<AccountDetails> {
        let last_trade_id = self.last_trade_id(sub_account_id, block).await?;

        let margin = match self.margin(sub_account_id, block).await {
            Ok(margin) => Some(margin),
            Err(e) => {
                warn!(
                    "Could not compute margin for {} due to feeds being stale: {:#}",
                    sub_account_id, e
                );
                None
            }
        };

        let portfolio = self.portfolio(sub_account_id, block).await?;

        Ok(AccountDetails {
            sub_account_id,
            last_trade_id,
            margin,
            portfolio,
        })
    }

    /// Spot prices of every market the portfolio holds, keyed by currency
    pub async fn spot_prices(
        &self,
        portfolio: &AccountPortfolio,
        block: Option<u64>,
    ) -> Result<BTreeMap<String, Option<I256>>> {
        let mut prices = BTreeMap::new();
        let mut requests = Vec::new();
        let mut currencies = Vec::new();

        for currency in portfolio.markets.keys() {
            match self.deployment.spot_feeds.get(currency) {
                Some(feed) => {
                    requests.push((*feed, ISpotFeed::getSpotCall {}));
                    currencies.push(currency.clone());
                }
                None => {
                    warn!("No spot feed known for {}", currency);
                    prices.insert(currency.clone(), None);
                }
            }
        }

        if !requests.is_empty() {
            let results = read_many(&self.chain, &requests, &ReadOptions::at(block), true).await?;
            for (currency, spot) in currencies.into_iter().zip(results) {
                let price = match spot.map(|s| to_i256(s.price, "spot price")).transpose() {
                    Ok(price) => price,
                    Err(e) => {
                        warn!("Ignoring spot price of {}: {:#}", currency, e);
                        None
                    }
                };
                prices.insert(currency, price);
            }
        }
        Ok(prices)
    }

    /// Every account that has ever had an auction started
    pub async fn auction_account_ids(&self) -> Result<BTreeSet<U256>> {
        let auction = self.config.contracts.auction;
        let solvent = fetch_events::<SolventAuctionStarted>(&self.chain, auction, 0, None).await?;
        let insolvent = fetch_events::<InsolventAuctionStarted>(&self.chain, auction, 0, None).await?;

        Ok(solvent
            .iter()
            .map(|l| l.event.accountId)
            .chain(insolvent.iter().map(|l| l.event.accountId))
            .collect())
    }
}
