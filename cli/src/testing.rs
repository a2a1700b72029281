//! In-memory chain for command tests
//!
//! Responses are stored ABI-encoded and keyed on calldata, so every read
//! goes through the same `sol!` codec as a live `cast` call.

use alloy_primitives::{address, Address, Bytes, B256, I256, U256};
use alloy_sol_types::{SolCall, SolEvent, SolValue};
use std::cell::RefCell;
use std::collections::HashMap;

use auction_model::fixed::parse_wad;

use crate::bindings::{IAuctionUtils, IDutchAuction, IManager, IPerpAsset, ISubAccounts};
use crate::client::{Call, ChainError, ChainReader, Log, LogFilter, Receipt, ReadOptions, TxSender};
use crate::config::Config;
use crate::contracts::SolventAuctionStarted;

pub const SUBACCOUNTS: Address = address!("1000000000000000000000000000000000000001");
pub const CASH: Address = address!("1000000000000000000000000000000000000002");
pub const AUCTION: Address = address!("1000000000000000000000000000000000000003");
pub const AUCTION_UTILS: Address = address!("1000000000000000000000000000000000000004");
pub const SECURITY_MODULE: Address = address!("1000000000000000000000000000000000000005");
pub const ETH_MANAGER: Address = address!("2000000000000000000000000000000000000001");
pub const ETH_BASE: Address = address!("2000000000000000000000000000000000000002");
pub const ETH_PERP: Address = address!("2000000000000000000000000000000000000003");
pub const ETH_OPTION: Address = address!("2000000000000000000000000000000000000004");
pub const ETH_SPOT: Address = address!("2000000000000000000000000000000000000005");

pub fn fake_config() -> Config {
    let text = format!(
        r#"
        rpc_url = "http://127.0.0.1:8545"
        batch_size = 2

        [contracts]
        subaccounts = "{SUBACCOUNTS}"
        cash = "{CASH}"
        auction = "{AUCTION}"
        auction_utils = "{AUCTION_UTILS}"
        security_module = "{SECURITY_MODULE}"

        [markets.ETH]
        manager = "{ETH_MANAGER}"
        base = "{ETH_BASE}"
        "#
    );
    Config::from_toml(&text).unwrap()
}

pub fn w(s: &str) -> I256 {
    parse_wad(s).unwrap()
}

type Key = (Address, Bytes, Option<u64>);

#[derive(Default)]
pub struct FakeChain {
    responses: RefCell<HashMap<Key, Bytes>>,
    logs: RefCell<Vec<Log>>,
    block: RefCell<u64>,
    calls: RefCell<Vec<&'static str>>,
    pub sent: RefCell<Vec<Call>>,
    revert_sends: RefCell<bool>,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain with the ETH manager answering its asset getters
    pub fn with_eth_market() -> Self {
        let chain = Self::new();
        chain.respond(ETH_MANAGER, &IManager::perpCall {}, ETH_PERP);
        chain.respond(ETH_MANAGER, &IManager::optionCall {}, ETH_OPTION);
        chain.respond(ETH_MANAGER, &IManager::spotFeedCall {}, ETH_SPOT);
        chain
    }

    pub fn respond<C: SolCall, R: SolValue>(&self, target: Address, call: &C, returns: R) {
        self.insert(target, call, None, returns);
    }

    /// Response that only applies to reads pinned at `block`
    pub fn respond_at<C: SolCall, R: SolValue>(&self, block: u64, target: Address, call: &C, returns: R) {
        self.insert(target, call, Some(block), returns);
    }

    fn insert<C: SolCall, R: SolValue>(&self, target: Address, call: &C, block: Option<u64>, returns: R) {
        self.responses
            .borrow_mut()
            .insert((target, call.abi_encode().into(), block), returns.abi_encode().into());
    }

    pub fn respond_balances(&self, sub_account_id: U256, balances: &[(Address, U256, I256)]) {
        self.respond_balances_at(None, sub_account_id, balances);
    }

    pub fn respond_balances_at(&self, block: Option<u64>, sub_account_id: U256, balances: &[(Address, U256, I256)]) {
        let entries: Vec<ISubAccounts::AssetBalance> = balances
            .iter()
            .map(|(asset, sub_id, amount)| ISubAccounts::AssetBalance {
                asset: *asset,
                subId: *sub_id,
                balance: *amount,
            })
            .collect();
        let call = ISubAccounts::getAccountBalancesCall {
            accountId: sub_account_id,
        };
        self.insert(SUBACCOUNTS, &call, block, entries);
    }

    pub fn respond_trade_id(&self, sub_account_id: U256, trade_id: u64) {
        let call = ISubAccounts::lastAccountTradeIdCall {
            accountId: sub_account_id,
        };
        self.respond(SUBACCOUNTS, &call, U256::from(trade_id));
    }

    pub fn respond_pnl(&self, perp: Address, sub_account_id: U256, pnl: I256) {
        let call = IPerpAsset::getUnsettledAndUnrealizedCashCall {
            accountId: sub_account_id,
        };
        self.respond(perp, &call, pnl);
    }

    /// 0.95 start, 0.2 cutoff, 600s fast, 3600s slow, 1800s insolvent, 0.1 buffer
    pub fn respond_auction_params(&self) {
        let params = IDutchAuction::AuctionParams {
            startingMtMPercentage: w("0.95").into_raw(),
            fastAuctionCutoffPercentage: w("0.2").into_raw(),
            fastAuctionLength: U256::from(600u64),
            slowAuctionLength: U256::from(3600u64),
            insolventAuctionLength: U256::from(1800u64),
            liquidatorFeeRate: w("0.05").into_raw(),
            bufferMarginPercentage: w("0.1").into_raw(),
        };
        self.respond(AUCTION, &IDutchAuction::getAuctionParamsCall {}, params);
    }

    pub fn respond_auction(&self, id: u64, ongoing: bool, insolvent: bool, start_time: u64) {
        let id = U256::from(id);
        let auction = IDutchAuction::Auction {
            accountId: id,
            scenarioId: U256::ZERO,
            insolvent,
            ongoing,
            cachedMM: w("-100"),
            startTime: U256::from(start_time),
            reservedCash: I256::ZERO,
        };
        self.respond(AUCTION, &IDutchAuction::getAuctionCall { accountId: id }, auction);
    }

    /// Trade id 7, worst scenario 2 and a cash-only portfolio
    pub fn respond_account(&self, id: u64, mm: &str, mtm: &str, cash: &str) {
        let id = U256::from(id);
        self.respond_trade_id(id, 7);
        self.respond(
            AUCTION_UTILS,
            &IAuctionUtils::getMMCall { accountId: id },
            (Address::ZERO, w(mm), w(mtm), U256::from(2u64)),
        );
        self.respond_balances(id, &[(CASH, U256::ZERO, w(cash))]);
    }

    pub fn set_block_number(&self, block: u64) {
        *self.block.borrow_mut() = block;
    }

    pub fn revert_sends(&self) {
        *self.revert_sends.borrow_mut() = true;
    }

    /// Record an event log with every field in the data section
    pub fn emit<E: SolEvent>(&self, address: Address, block_number: u64, event: &E) {
        let mut logs = self.logs.borrow_mut();
        let transaction_hash = B256::with_last_byte(logs.len() as u8 + 1);
        logs.push(Log {
            address,
            topics: vec![E::SIGNATURE_HASH],
            data: event.encode_data().into(),
            block_number,
            transaction_hash,
        });
    }

    /// Solvent auction start on the auction contract, mark-to-market 1
    pub fn emit_solvent_start(&self, id: u64, block_number: u64, fee: u64) {
        let event = SolventAuctionStarted {
            accountId: U256::from(id),
            scenarioId: U256::ZERO,
            markToMarket: w("1"),
            fee: U256::from(fee),
        };
        self.emit(AUCTION, block_number, &event);
    }

    pub fn call_count(&self, signature: &str) -> usize {
        self.calls.borrow().iter().filter(|s| **s == signature).count()
    }
}

impl ChainReader for FakeChain {
    async fn call(&self, call: &Call, options: &ReadOptions) -> Result<Bytes, ChainError> {
        self.calls.borrow_mut().push(call.signature);

        let responses = self.responses.borrow();
        let key = |block| (call.target, call.data.clone(), block);
        options
            .block
            .and_then(|b| responses.get(&key(Some(b))))
            .or_else(|| responses.get(&key(None)))
            .cloned()
            .ok_or_else(|| ChainError::Command {
                command: "call".to_string(),
                stderr: format!("execution reverted: {} on {}", call.signature, call.target),
            })
    }

    async fn multicall(
        &self,
        calls: &[Call],
        options: &ReadOptions,
        allow_partial_failure: bool,
    ) -> Result<Vec<Option<Bytes>>, ChainError> {
        let mut out = Vec::with_capacity(calls.len());
        for call in calls {
            match self.call(call, options).await {
                Ok(data) => out.push(Some(data)),
                Err(_) if allow_partial_failure => out.push(None),
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainError> {
        Ok(self
            .logs
            .borrow()
            .iter()
            .filter(|log| log.address == filter.address && log.topics.first() == Some(&filter.topic))
            .filter(|log| log.block_number >= filter.from_block)
            .filter(|log| filter.to_block.map_or(true, |to| log.block_number <= to))
            .cloned()
            .collect())
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(*self.block.borrow())
    }
}

impl TxSender for FakeChain {
    async fn send(&self, call: &Call) -> Result<Receipt, ChainError> {
        self.sent.borrow_mut().push(call.clone());
        let transaction_hash = B256::with_last_byte(0xee);
        if *self.revert_sends.borrow() {
            return Err(ChainError::Reverted {
                transaction_hash,
                error: format!("{} returned status 0", call.signature),
            });
        }
        Ok(Receipt {
            transaction_hash,
            block_number: Some(*self.block.borrow()),
        })
    }
}
