//! Option instrument id (subId) codec
//!
//! Layout of the packed id, low bits first:
//! - bits 0..32   expiry (unix seconds)
//! - bits 32..95  strike / 1e10 (63 bits)
//! - bit  95      1 = call, 0 = put

use alloy_primitives::U256;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use thiserror::Error;

/// Strikes are stored on-chain in units of 1e10 (8 significant decimals of an 18dp value)
pub const STRIKE_UNIT: u128 = 10_000_000_000;

/// Largest strike unit count that fits in the 63-bit field
pub const MAX_STRIKE_UNITS: u64 = (1 << 63) - 1;

const EXPIRY_BITS: usize = 32;
const CALL_BIT: usize = 95;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubIdError {
    #[error("strike {strike} is not a multiple of 1e10 and cannot be packed")]
    StrikeNotRepresentable { strike: u128 },
    #[error("strike {strike} exceeds the 63-bit strike field")]
    StrikeOutOfRange { strike: u128 },
}

/// Structured identity of one option instrument
///
/// Ordering is by expiry, then strike, then put before call, which is the
/// order options are listed in a portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OptionDetails {
    /// Unix seconds
    pub expiry: u32,
    /// 18-decimal strike price
    pub strike: u128,
    pub is_call: bool,
}

impl OptionDetails {
    /// Unpack a subId. Bits above the call flag are ignored here; use
    /// [`OptionDetails::encode`] to check an id is canonical.
    pub fn decode(sub_id: U256) -> Self {
        let expiry = (sub_id & U256::from(u32::MAX)).as_limbs()[0] as u32;
        let units = ((sub_id >> EXPIRY_BITS) & U256::from(MAX_STRIKE_UNITS)).as_limbs()[0];
        let is_call = !(sub_id >> CALL_BIT).is_zero();

        Self {
            expiry,
            strike: units as u128 * STRIKE_UNIT,
            is_call,
        }
    }

    /// Pack into a subId. Strikes off the 1e10 grid are rejected rather than
    /// silently truncated; round with [`round_strike`] first if that is intended.
    pub fn encode(&self) -> Result<U256, SubIdError> {
        if self.strike % STRIKE_UNIT != 0 {
            return Err(SubIdError::StrikeNotRepresentable {
                strike: self.strike,
            });
        }
        let units = self.strike / STRIKE_UNIT;
        if units > MAX_STRIKE_UNITS as u128 {
            return Err(SubIdError::StrikeOutOfRange {
                strike: self.strike,
            });
        }

        Ok((U256::from(self.is_call as u64) << CALL_BIT)
            | (U256::from(units) << EXPIRY_BITS)
            | U256::from(self.expiry))
    }

    /// Display key: `{isoExpiry}__{strike}__{C|P}`
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Expiry as an ISO-8601 timestamp with millisecond precision
    pub fn expiry_iso(&self) -> String {
        DateTime::<Utc>::from_timestamp(self.expiry as i64, 0)
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_else(|| self.expiry.to_string())
    }
}

impl fmt::Display for OptionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}__{}__{}",
            self.expiry_iso(),
            strike_display(self.strike),
            if self.is_call { "C" } else { "P" }
        )
    }
}

/// Truncate a strike down to the nearest packable value
pub fn round_strike(strike: u128) -> u128 {
    strike - strike % STRIKE_UNIT
}

/// Strike in whole units, at most 3 decimals, no trailing zeros
fn strike_display(strike: u128) -> String {
    let milli = strike / 1_000_000_000_000_000;
    let whole = milli / 1000;
    let frac = milli % 1000;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:03}", frac);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}
