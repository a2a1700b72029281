//! Asset address directory
//!
//! Maps every asset contract the exchange lists to the role it plays in a
//! subaccount: the single cash asset, or a market's base, perp or option
//! asset. Built once at startup and passed by reference to whatever needs to
//! classify balances.

use alloy_primitives::Address;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("asset {address} is listed twice ({first} and {second})")]
    DuplicateAsset {
        address: Address,
        first: String,
        second: String,
    },
}

/// Role of an asset within a market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarketRole {
    Base,
    Perp,
    Option,
}

/// Per-market asset contracts. A market may not list every instrument class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketAssets {
    pub base: Option<Address>,
    pub perp: Option<Address>,
    pub option: Option<Address>,
}

/// What a known asset address resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetKind {
    Cash,
    Market { currency: String, role: MarketRole },
}

impl AssetKind {
    fn describe(&self) -> String {
        match self {
            AssetKind::Cash => "cash".to_string(),
            AssetKind::Market { currency, role } => format!("{currency} {role:?}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssetDirectory {
    cash: Address,
    markets: BTreeMap<String, MarketAssets>,
    lookup: HashMap<Address, AssetKind>,
}

impl AssetDirectory {
    pub fn new(
        cash: Address,
        markets: impl IntoIterator<Item = (String, MarketAssets)>,
    ) -> Result<Self, DirectoryError> {
        let markets: BTreeMap<String, MarketAssets> = markets.into_iter().collect();
        let mut lookup = HashMap::new();
        lookup.insert(cash, AssetKind::Cash);

        for (currency, assets) in &markets {
            let roles = [
                (assets.base, MarketRole::Base),
                (assets.perp, MarketRole::Perp),
                (assets.option, MarketRole::Option),
            ];
            for (address, role) in roles {
                let Some(address) = address else { continue };
                let kind = AssetKind::Market {
                    currency: currency.clone(),
                    role,
                };
                if let Some(existing) = lookup.get(&address) {
                    return Err(DirectoryError::DuplicateAsset {
                        address,
                        first: existing.describe(),
                        second: kind.describe(),
                    });
                }
                lookup.insert(address, kind);
            }
        }

        Ok(Self {
            cash,
            markets,
            lookup,
        })
    }

    pub fn cash(&self) -> Address {
        self.cash
    }

    pub fn markets(&self) -> &BTreeMap<String, MarketAssets> {
        &self.markets
    }

    pub fn market(&self, currency: &str) -> Option<&MarketAssets> {
        self.markets.get(currency)
    }

    /// Resolve an asset address. Addresses are compared as bytes, so the
    /// checksum casing of the source never matters.
    pub fn classify(&self, asset: &Address) -> Option<&AssetKind> {
        self.lookup.get(asset)
    }
}
