//! Option subId utilities

use alloy_primitives::{I256, U256};
use anyhow::{Context, Result};
use auction_model::fixed::{format_wad, parse_wad};
use auction_model::subid::round_strike;
use auction_model::OptionDetails;
use chrono::{DateTime, NaiveDate};
use log::warn;

use crate::display;

/// Expiry as unix seconds, an RFC 3339 timestamp or a `YYYY-MM-DD` date (08:00 UTC)
pub fn parse_expiry(text: &str) -> Result<u32> {
    let seconds = if let Ok(seconds) = text.parse::<u64>() {
        seconds as i64
    } else if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        time.timestamp()
    } else {
        let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .with_context(|| format!("unrecognised expiry `{text}`"))?;
        date.and_hms_opt(8, 0, 0)
            .map(|t| t.and_utc().timestamp())
            .with_context(|| format!("unrecognised expiry `{text}`"))?
    };
    u32::try_from(seconds).with_context(|| format!("expiry {seconds} does not fit in 32 bits"))
}

/// Parse a strike in whole units. With `round` it is truncated onto the packable grid.
pub fn parse_strike(text: &str, round: bool) -> Result<u128> {
    let value = parse_wad(text).with_context(|| format!("invalid strike `{text}`"))?;
    if value.is_negative() {
        anyhow::bail!("strike must not be negative");
    }
    let strike = u128::try_from(value.into_raw()).context("strike too large")?;
    if round {
        let rounded = round_strike(strike);
        if rounded != strike {
            warn!("Strike {} rounded down to the packable grid", text);
        }
        Ok(rounded)
    } else {
        Ok(strike)
    }
}

pub fn decode(sub_id: U256) -> OptionDetails {
    let details = OptionDetails::decode(sub_id);
    display::heading("Option SubId");
    display::field("SubId", sub_id);
    display::field("Expiry", format!("{} ({})", details.expiry_iso(), details.expiry));
    display::field("Strike", strike_text(details.strike));
    display::field("Type", if details.is_call { "call" } else { "put" });
    display::field("Key", details.key());
    if details.encode().ok() != Some(sub_id) {
        warn!("SubId {} is not canonical: it has bits set above the call flag", sub_id);
    }
    details
}

pub fn encode(expiry: &str, strike: &str, is_call: bool, round: bool) -> Result<U256> {
    let details = OptionDetails {
        expiry: parse_expiry(expiry)?,
        strike: parse_strike(strike, round)?,
        is_call,
    };
    let sub_id = details.encode()?;
    display::heading("Option SubId");
    display::field("Key", details.key());
    display::field("SubId", sub_id);
    Ok(sub_id)
}

fn strike_text(strike: u128) -> String {
    format_wad(I256::from_raw(U256::from(strike)))
}
