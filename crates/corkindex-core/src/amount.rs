//! Arbitrary-precision token amounts and 18-decimal fixed point helpers.
//!
//! On-chain `uint256` values do not fit any primitive, and balances may go
//! negative when events are observed out of order, so every amount is a signed
//! [`BigInt`]. Amounts are serialized as decimal strings.

use std::str::FromStr;

use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use bigdecimal::num_traits::{pow, Signed};
use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};

pub use bigdecimal::num_bigint::BigInt as Amount;

/// Decimals of the WAD fixed-point representation.
pub const WAD_DECIMALS: u8 = 18;

/// `10^18`.
pub fn wad() -> BigInt {
    ten_pow(WAD_DECIMALS as usize)
}

fn ten_pow(exp: usize) -> BigInt {
    pow(BigInt::from(10u8), exp)
}

/// Rescale a value with `decimals` fractional digits to 18 decimals.
///
/// Fewer than 18 decimals multiply by `10^(18-N)`, more than 18 integer-divide
/// by `10^(N-18)` (truncating toward zero).
pub fn scale_to_wad(value: &BigInt, decimals: u8) -> BigInt {
    match decimals.cmp(&WAD_DECIMALS) {
        std::cmp::Ordering::Equal => value.clone(),
        std::cmp::Ordering::Less => value * ten_pow((WAD_DECIMALS - decimals) as usize),
        std::cmp::Ordering::Greater => value / ten_pow((decimals - WAD_DECIMALS) as usize),
    }
}

/// `a * b / 10^18`, both operands in WAD.
pub fn mul_wad(a: &BigInt, b: &BigInt) -> BigInt {
    (a * b) / wad()
}

/// Human-readable value of a fixed-point integer, e.g. a WAD USD valuation.
pub fn to_decimal(value: &BigInt, decimals: u8) -> BigDecimal {
    BigDecimal::new(value.clone(), decimals as i64)
}

/// `true` for a strictly positive amount.
pub fn is_positive(value: &BigInt) -> bool {
    value.is_positive()
}

/// Parse a decimal (or `0x`-prefixed hex) integer string.
pub fn parse_amount(s: &str) -> Result<BigInt, String> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let parsed = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        BigInt::parse_bytes(hex.as_bytes(), 16)
            .ok_or_else(|| format!("invalid hex integer '{s}'"))?
    } else {
        BigInt::from_str(digits).map_err(|e| format!("invalid integer '{s}': {e}"))?
    };
    Ok(if negative { -parsed } else { parsed })
}

// ─── Serde ────────────────────────────────────────────────────────────────────

/// `#[serde(with = "amount::decimal")]`: a [`BigInt`] written as a decimal
/// string and read from a string or a JSON integer.
pub mod decimal {
    use super::*;

    pub fn serialize<S: Serializer>(value: &BigInt, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigInt, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = BigInt;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str("an integer or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<BigInt, E> {
        Ok(BigInt::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<BigInt, E> {
        Ok(BigInt::from(v))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<BigInt, E> {
        Ok(BigInt::from(v))
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> Result<BigInt, E> {
        Ok(BigInt::from(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<BigInt, E> {
        // Only integral floats inside the exactly-representable range.
        if v.fract() == 0.0 && v.abs() < 9_007_199_254_740_992.0 {
            Ok(BigInt::from(v as i64))
        } else {
            Err(E::custom(format!(
                "{v} is not an exact integer; encode large amounts as strings"
            )))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<BigInt, E> {
        parse_amount(v).map_err(E::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "decimal")]
        value: BigInt,
    }

    #[test]
    fn scale_up_and_down() {
        let v = BigInt::from(250_000_000u64); // 2.5 with 8 decimals
        assert_eq!(scale_to_wad(&v, 8), BigInt::from(2_500_000_000_000_000_000u128));
        assert_eq!(scale_to_wad(&v, 18), v);
        assert_eq!(scale_to_wad(&BigInt::from(12_345u32), 20), BigInt::from(123));
        assert_eq!(scale_to_wad(&BigInt::from(7u8), 0), BigInt::from(7u8) * wad());
    }

    #[test]
    fn mul_wad_truncates() {
        let half = wad() / 2;
        assert_eq!(mul_wad(&BigInt::from(3u8), &half), BigInt::from(1u8));
        assert_eq!(mul_wad(&wad(), &wad()), wad());
    }

    #[test]
    fn parses_strings_numbers_and_hex() {
        let h: Holder = serde_json::from_str(r#"{"value":"123456789012345678901234567890"}"#).unwrap();
        assert_eq!(h.value.to_string(), "123456789012345678901234567890");

        let h: Holder = serde_json::from_str(r#"{"value":42}"#).unwrap();
        assert_eq!(h.value, BigInt::from(42));

        let h: Holder = serde_json::from_str(r#"{"value":"0xff"}"#).unwrap();
        assert_eq!(h.value, BigInt::from(255));

        assert_eq!(parse_amount("-10").unwrap(), BigInt::from(-10));
        assert!(serde_json::from_str::<Holder>(r#"{"value":1.5}"#).is_err());
    }

    #[test]
    fn wad_values_render_as_decimals() {
        let v = BigInt::from(1_500_000_000_000_000_000u128);
        assert_eq!(to_decimal(&v, 18), BigDecimal::from_str("1.5").unwrap());
    }

    #[test]
    fn serializes_as_string() {
        let h = Holder { value: BigInt::from(-5) };
        assert_eq!(serde_json::to_string(&h).unwrap(), r#"{"value":"-5"}"#);
    }
}
