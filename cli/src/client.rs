//! Chain access layer
//!
//! Reads and writes go through the [`ChainReader`] and [`TxSender`] traits so
//! the commands never care how the chain is reached. Calls travel as ABI
//! encoded calldata built from the `sol!` bindings; [`CastClient`] implements
//! both traits by spawning foundry's `cast`.

use alloy_primitives::{hex, Address, Bytes, B256};
use alloy_sol_types::{SolCall, SolEvent};
use futures::future::join_all;
use indicatif::ProgressBar;
use log::{debug, warn};
use rand::Rng;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::sleep;

use crate::bindings::IMulticall3;
use crate::config::Config;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`cast {command}` failed: {stderr}")]
    Command { command: String, stderr: String },
    #[error("{operation} failed after {attempts} attempt(s): {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },
    #[error("transaction {transaction_hash} reverted: {error}")]
    Reverted { transaction_hash: B256, error: String },
    #[error("failed to decode {context}: {reason}")]
    Decode { context: String, reason: String },
    #[error("no signing key configured for sending transactions")]
    MissingSigner,
}

impl ChainError {
    /// Failures worth another attempt: the node or the transport hiccuped
    fn is_transient(&self) -> bool {
        matches!(self, ChainError::Command { .. })
    }

    pub fn decode(context: impl Into<String>, reason: impl ToString) -> Self {
        ChainError::Decode {
            context: context.into(),
            reason: reason.to_string(),
        }
    }
}

/// One encoded contract call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub target: Address,
    /// Canonical signature, e.g. `getMM(uint256)`
    pub signature: &'static str,
    pub data: Bytes,
}

impl Call {
    pub fn new<C: SolCall>(target: Address, call: &C) -> Self {
        Self {
            target,
            signature: C::SIGNATURE,
            data: call.abi_encode().into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Pin the read to a historical block instead of latest
    pub block: Option<u64>,
    /// Override the client's retry budget
    pub retries: Option<u32>,
}

impl ReadOptions {
    pub fn at(block: Option<u64>) -> Self {
        Self {
            block,
            retries: None,
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub event: &'static str,
    /// topic0 of the event
    pub topic: B256,
    pub from_block: u64,
    /// `None` reads up to latest
    pub to_block: Option<u64>,
}

impl LogFilter {
    pub fn new<E: SolEvent>(address: Address, from_block: u64, to_block: Option<u64>) -> Self {
        Self {
            address,
            event: E::SIGNATURE,
            topic: E::SIGNATURE_HASH,
            from_block,
            to_block,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub transaction_hash: B256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
}

#[allow(async_fn_in_trait)]
pub trait ChainReader {
    /// Raw return data of `call`
    async fn call(&self, call: &Call, options: &ReadOptions) -> Result<Bytes, ChainError>;

    /// Batch reads in one round trip. With `allow_partial_failure` a failed
    /// slot comes back as `None`; without it any failure fails the batch.
    async fn multicall(
        &self,
        calls: &[Call],
        options: &ReadOptions,
        allow_partial_failure: bool,
    ) -> Result<Vec<Option<Bytes>>, ChainError>;

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainError>;

    async fn block_number(&self) -> Result<u64, ChainError>;
}

#[allow(async_fn_in_trait)]
pub trait TxSender {
    /// Submit and wait for the receipt. Never retried.
    async fn send(&self, call: &Call) -> Result<Receipt, ChainError>;
}

/// Randomised backoff for transient read failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }

    fn delay(&self) -> Duration {
        let min = self.min_delay.as_millis() as u64;
        let max = (self.max_delay.as_millis() as u64).max(min);
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Run `attempt` until it succeeds, fails permanently, or the budget is spent.
/// `retries` extra attempts are made after the first.
pub async fn with_retries<T, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<T, ChainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    let attempts = policy.retries.saturating_add(1);
    let mut last_error = String::new();

    for n in 1..=attempts {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                debug!("{}: attempt {}/{} failed: {}", operation, n, attempts, e);
                last_error = e.to_string();
                if n < attempts {
                    let delay = policy.delay();
                    debug!("{}: retrying in {:.1}s", operation, delay.as_secs_f64());
                    sleep(delay).await;
                }
            }
        }
    }

    Err(ChainError::RetriesExhausted {
        operation: operation.to_string(),
        attempts,
        last_error,
    })
}

/// Run `f` over `items` in fixed windows, awaiting each window before the next
pub async fn in_windows<T, R, F, Fut>(
    items: &[T],
    window: usize,
    progress: Option<&ProgressBar>,
    f: F,
) -> Vec<R>
where
    F: Fn(&T) -> Fut,
    Fut: Future<Output = R>,
{
    let mut results = Vec::with_capacity(items.len());
    for chunk in items.chunks(window.max(1)) {
        results.extend(join_all(chunk.iter().map(&f)).await);
        if let Some(bar) = progress {
            bar.inc(chunk.len() as u64);
        }
    }
    results
}

/// Multicall3 `aggregate3` call wrapping `calls`
pub fn aggregate3_call(calls: &[Call], allow_partial_failure: bool) -> IMulticall3::aggregate3Call {
    IMulticall3::aggregate3Call {
        calls: calls
            .iter()
            .map(|call| IMulticall3::Call3 {
                target: call.target,
                allowFailure: allow_partial_failure,
                callData: call.data.clone(),
            })
            .collect(),
    }
}

/// Split `aggregate3` results back into per-call return data
pub fn split_aggregate3(
    results: Vec<IMulticall3::Result3>,
    calls: &[Call],
    allow_partial_failure: bool,
) -> Result<Vec<Option<Bytes>>, ChainError> {
    if results.len() != calls.len() {
        return Err(ChainError::decode(
            IMulticall3::aggregate3Call::SIGNATURE,
            format!("{} results for {} calls", results.len(), calls.len()),
        ));
    }

    let mut out = Vec::with_capacity(calls.len());
    for (index, (result, call)) in results.into_iter().zip(calls).enumerate() {
        if result.success {
            out.push(Some(result.returnData));
        } else if allow_partial_failure {
            warn!("Multicall slot {} ({} on {}) reverted", index, call.signature, call.target);
            out.push(None);
        } else {
            return Err(ChainError::decode(
                format!("{} (slot {})", call.signature, index),
                "call reverted",
            ));
        }
    }

    Ok(out)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CastLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
    block_number: serde_json::Value,
    transaction_hash: B256,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CastReceipt {
    status: serde_json::Value,
    transaction_hash: B256,
    #[serde(default)]
    block_number: Option<serde_json::Value>,
}

/// JSON-RPC quantity: hex string, decimal string or number
fn parse_quantity(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    }
}

fn preview(args: &[String], limit: usize) -> String {
    let joined = args.join(" ");
    if joined.len() > limit {
        let cut = (0..=limit).rev().find(|i| joined.is_char_boundary(*i)).unwrap_or(0);
        format!("{}[...]", &joined[..cut])
    } else {
        joined
    }
}

/// `cast`-backed implementation of both chain traits
#[derive(Debug, Clone)]
pub struct CastClient {
    cast_bin: String,
    rpc_url: String,
    multicall: Address,
    policy: RetryPolicy,
    signing_key: Option<String>,
}

impl CastClient {
    pub fn new(config: &Config) -> Self {
        Self {
            cast_bin: config.cast_bin.clone(),
            rpc_url: config.rpc_url.clone(),
            multicall: config.contracts.multicall,
            policy: RetryPolicy::new(config.retries),
            signing_key: None,
        }
    }

    pub fn with_signer(mut self, signing_key: String) -> Self {
        self.signing_key = Some(signing_key);
        self
    }

    fn policy(&self, options: &ReadOptions) -> RetryPolicy {
        match options.retries {
            Some(retries) => RetryPolicy {
                retries,
                ..self.policy.clone()
            },
            None => self.policy.clone(),
        }
    }

    /// One `cast` invocation. The signing key travels via the environment,
    /// never the argument list.
    async fn cast(&self, args: &[String]) -> Result<String, ChainError> {
        let mut command = Command::new(&self.cast_bin);
        command.args(args).kill_on_drop(true);
        if let Some(key) = &self.signing_key {
            command.env("ETH_PRIVATE_KEY", key);
        }

        let output = command.output().await.map_err(|source| ChainError::Spawn {
            program: self.cast_bin.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(ChainError::Command {
                command: args.first().cloned().unwrap_or_default(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Dump an execution trace of a failed transaction to the debug log
    async fn trace(&self, transaction_hash: B256) {
        let args = vec![
            "run".to_string(),
            "--rpc-url".to_string(),
            self.rpc_url.clone(),
            transaction_hash.to_string(),
        ];
        match self.cast(&args).await {
            Ok(trace) => debug!("Trace of {}:\n{}", transaction_hash, trace),
            Err(e) => warn!("Could not trace {}: {}", transaction_hash, e),
        }
    }
}

fn parse_return_data(context: &str, raw: &str) -> Result<Bytes, ChainError> {
    hex::decode(raw.trim())
        .map(Bytes::from)
        .map_err(|e| ChainError::decode(context, e))
}

impl ChainReader for CastClient {
    async fn call(&self, call: &Call, options: &ReadOptions) -> Result<Bytes, ChainError> {
        let mut args = vec!["call".to_string(), "--rpc-url".to_string(), self.rpc_url.clone()];
        if let Some(block) = options.block {
            args.push("--block".to_string());
            args.push(block.to_string());
        }
        // Raw calldata in place of a signature: cast prints the raw return data
        let calldata = hex::encode_prefixed(&call.data);
        debug!("cast call {} {} {}", call.target, call.signature, preview(&[calldata.clone()], 80));
        args.push(call.target.to_string());
        args.push(calldata);

        let raw = with_retries(call.signature, &self.policy(options), || self.cast(&args)).await?;
        parse_return_data(call.signature, &raw)
    }

    async fn multicall(
        &self,
        calls: &[Call],
        options: &ReadOptions,
        allow_partial_failure: bool,
    ) -> Result<Vec<Option<Bytes>>, ChainError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let wrapped = Call::new(self.multicall, &aggregate3_call(calls, allow_partial_failure));
        let raw = self.call(&wrapped, options).await?;
        let returned = IMulticall3::aggregate3Call::abi_decode_returns(&raw, true)
            .map_err(|e| ChainError::decode(wrapped.signature, e))?;
        split_aggregate3(returned.returnData, calls, allow_partial_failure)
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainError> {
        let args = vec![
            "logs".to_string(),
            "-j".to_string(),
            "--rpc-url".to_string(),
            self.rpc_url.clone(),
            "--address".to_string(),
            filter.address.to_string(),
            "--from-block".to_string(),
            filter.from_block.to_string(),
            "--to-block".to_string(),
            filter
                .to_block
                .map(|b| b.to_string())
                .unwrap_or_else(|| "latest".to_string()),
            filter.topic.to_string(),
        ];
        debug!("cast {} ({})", preview(&args, 200), filter.event);

        let operation = format!("logs {}", filter.event);
        let raw = with_retries(&operation, &self.policy, || self.cast(&args)).await?;
        let entries: Vec<CastLog> =
            serde_json::from_str(&raw).map_err(|e| ChainError::decode(&operation, e))?;

        entries
            .into_iter()
            .map(|entry| {
                let block_number = parse_quantity(&entry.block_number)
                    .ok_or_else(|| ChainError::decode(&operation, "bad block number"))?;
                Ok(Log {
                    address: entry.address,
                    topics: entry.topics,
                    data: entry.data,
                    block_number,
                    transaction_hash: entry.transaction_hash,
                })
            })
            .collect()
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let args = vec![
            "block-number".to_string(),
            "--rpc-url".to_string(),
            self.rpc_url.clone(),
        ];
        let raw = with_retries("block-number", &self.policy, || self.cast(&args)).await?;
        raw.parse().map_err(|e| ChainError::decode("block-number", e))
    }
}

impl TxSender for CastClient {
    async fn send(&self, call: &Call) -> Result<Receipt, ChainError> {
        if self.signing_key.is_none() {
            return Err(ChainError::MissingSigner);
        }

        let calldata = hex::encode_prefixed(&call.data);
        debug!("cast send <...> {} {} {}", call.target, call.signature, preview(&[calldata.clone()], 150));

        let command = vec![
            "send".to_string(),
            "-j".to_string(),
            "--rpc-url".to_string(),
            self.rpc_url.clone(),
            call.target.to_string(),
            calldata,
        ];

        let raw = self.cast(&command).await?;
        let receipt: CastReceipt =
            serde_json::from_str(&raw).map_err(|e| ChainError::decode(call.signature, e))?;

        if parse_quantity(&receipt.status) != Some(1) {
            debug!("Failed transaction receipt: {}", raw);
            self.trace(receipt.transaction_hash).await;
            return Err(ChainError::Reverted {
                transaction_hash: receipt.transaction_hash,
                error: format!("{} returned status {}", call.signature, receipt.status),
            });
        }

        Ok(Receipt {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number.as_ref().and_then(parse_quantity),
        })
    }
}
