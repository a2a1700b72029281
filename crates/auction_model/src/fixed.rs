//! Fixed-point decimal helpers
//!
//! Protocol amounts are integers scaled by `10^decimals` (18 for cash, margin
//! and percentages, 6 for USDC). These helpers convert between that
//! representation and human decimal strings without going through floats.

use alloy_primitives::{I256, U256};
use log::warn;
use thiserror::Error;

use crate::DECIMALS;

/// 10^18 as a raw u64
pub const WAD_U64: u64 = 1_000_000_000_000_000_000;

/// Exponents beyond this are rejected instead of expanded into huge strings
const MAX_EXPONENT: i64 = 512;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FixedError {
    #[error("empty decimal string")]
    Empty,
    #[error("invalid decimal string: {input:?}")]
    InvalidDigit { input: String },
    #[error("invalid exponent in decimal string: {input:?}")]
    InvalidExponent { input: String },
    #[error("decimal value out of range for int256: {input:?}")]
    Overflow { input: String },
}

/// One whole unit at 18 decimals
#[inline]
pub fn wad() -> I256 {
    I256::from_raw(U256::from(WAD_U64))
}

/// `10^decimals` as an unsigned 256-bit integer
#[inline]
pub fn pow10(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}

/// Lift a native integer into I256 (raw units, no scaling)
#[inline]
pub fn int(value: i128) -> I256 {
    let magnitude = I256::from_raw(U256::from(value.unsigned_abs()));
    if value < 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Lift a second count into I256 (raw units, no scaling)
#[inline]
pub fn seconds(value: u64) -> I256 {
    I256::from_raw(U256::from(value))
}

/// `a * b / d`, truncating toward zero. `None` on overflow or `d == 0`.
#[inline]
pub fn mul_div(a: I256, b: I256, d: I256) -> Option<I256> {
    a.checked_mul(b)?.checked_div(d)
}

/// Absolute value
#[inline]
pub fn abs(value: I256) -> I256 {
    if value.is_negative() {
        -value
    } else {
        value
    }
}

/// Parse a decimal string into a fixed-point integer with `decimals` places.
///
/// Accepts an optional sign, a fractional part and scientific notation
/// (`1.5e-3`, `2E+4`). Exponents are applied by shifting digits, so the
/// result is exact. Fractional digits beyond `decimals` are truncated with a
/// warning, never rounded.
pub fn parse_fixed(text: &str, decimals: u8) -> Result<I256, FixedError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(FixedError::Empty);
    }

    let (negative, unsigned) = match trimmed.as_bytes()[0] {
        b'-' => (true, &trimmed[1..]),
        b'+' => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let (mantissa, exponent) = match unsigned.find(|c: char| c == 'e' || c == 'E') {
        Some(idx) => (&unsigned[..idx], Some(&unsigned[idx + 1..])),
        None => (unsigned, None),
    };

    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if (int_part.is_empty() && frac_part.is_empty())
        || !is_digits(int_part)
        || !is_digits(frac_part)
    {
        return Err(FixedError::InvalidDigit {
            input: text.to_string(),
        });
    }

    let mut int_digits = int_part.to_string();
    let mut frac_digits = frac_part.to_string();

    if let Some(exp) = exponent {
        let exp: i64 = exp.parse().map_err(|_| FixedError::InvalidExponent {
            input: text.to_string(),
        })?;
        if exp.abs() > MAX_EXPONENT {
            return Err(FixedError::InvalidExponent {
                input: text.to_string(),
            });
        }
        (int_digits, frac_digits) = shift_point(&int_digits, &frac_digits, exp);
        warn!(
            "parse_fixed: {} uses exponent notation, normalised to {}.{}",
            text,
            if int_digits.is_empty() { "0" } else { int_digits.as_str() },
            if frac_digits.is_empty() { "0" } else { frac_digits.as_str() },
        );
    }

    let places = decimals as usize;
    if frac_digits.len() > places {
        warn!(
            "parse_fixed: {} has more than {} decimals, stripping excess",
            text, places
        );
        frac_digits.truncate(places);
    }

    let scaled = format!(
        "{}{}{}",
        if int_digits.is_empty() { "0" } else { int_digits.as_str() },
        frac_digits,
        "0".repeat(places - frac_digits.len())
    );

    let magnitude = U256::from_str_radix(&scaled, 10).map_err(|_| FixedError::Overflow {
        input: text.to_string(),
    })?;
    if magnitude > I256::MAX.into_raw() {
        return Err(FixedError::Overflow {
            input: text.to_string(),
        });
    }

    let value = I256::from_raw(magnitude);
    Ok(if negative { -value } else { value })
}

/// Parse at the protocol's 18 decimals
pub fn parse_wad(text: &str) -> Result<I256, FixedError> {
    parse_fixed(text, DECIMALS)
}

/// Format a fixed-point integer as a decimal string.
///
/// Trailing fractional zeros are trimmed down to a single `0`, so
/// `1e18` formats as `"1.0"` and `575e15` as `"0.575"`.
pub fn format_fixed(value: I256, decimals: u8) -> String {
    let sign = if value.is_negative() { "-" } else { "" };
    let magnitude = value.unsigned_abs();

    if decimals == 0 {
        return format!("{sign}{magnitude}");
    }

    let scale = pow10(decimals);
    let whole = magnitude / scale;
    let mut frac = format!(
        "{:0>width$}",
        (magnitude % scale).to_string(),
        width = decimals as usize
    );
    let keep = frac.trim_end_matches('0').len().max(1);
    frac.truncate(keep);

    format!("{sign}{whole}.{frac}")
}

/// Format at the protocol's 18 decimals
pub fn format_wad(value: I256) -> String {
    format_fixed(value, DECIMALS)
}

fn is_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

/// Move the decimal point of `int.frac` by `exponent` places
fn shift_point(int_digits: &str, frac_digits: &str, exponent: i64) -> (String, String) {
    let digits = format!("{int_digits}{frac_digits}");
    let point = int_digits.len() as i64 + exponent;

    if point <= 0 {
        (
            String::new(),
            format!("{}{}", "0".repeat(point.unsigned_abs() as usize), digits),
        )
    } else if point as usize >= digits.len() {
        let pad = point as usize - digits.len();
        (format!("{}{}", digits, "0".repeat(pad)), String::new())
    } else {
        let (whole, frac) = digits.split_at(point as usize);
        (whole.to_string(), frac.to_string())
    }
}
