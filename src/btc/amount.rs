//! Exact amount conversions
//!
//! Node RPC amounts are decimal BTC values. They are read from the raw JSON
//! number text and converted to satoshis without passing through `f64`.

use bitcoin::{Amount, Denomination};

use crate::errors::{ChainQueryError, TransactionError};

/// Parse a fee string in satoshis
///
/// Accepts decimal, or `0x`/`0o`/`0b` prefixed integers with an optional sign.
/// A leading `0` without a base letter is still decimal, and `_` separators are
/// not accepted.
pub fn parse_fee(fee: &str) -> Result<i64, TransactionError> {
    let trimmed = fee.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let (radix, digits) = if let Some(d) = strip_radix(body, "0x") {
        (16, d)
    } else if let Some(d) = strip_radix(body, "0o") {
        (8, d)
    } else if let Some(d) = strip_radix(body, "0b") {
        (2, d)
    } else {
        (10, body)
    };

    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return Err(TransactionError::InvalidFee(fee.to_string()));
    }

    let magnitude = i64::from_str_radix(digits, radix)
        .map_err(|_| TransactionError::InvalidFee(fee.to_string()))?;
    Ok(if negative { -magnitude } else { magnitude })
}

fn strip_radix<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    s.strip_prefix(prefix)
        .or_else(|| s.strip_prefix(&prefix.to_ascii_uppercase()))
}

/// Convert a decimal BTC number (as JSON text) into satoshis
pub fn btc_to_sats(text: &str) -> Result<u64, ChainQueryError> {
    Amount::from_str_in(text.trim(), Denomination::Bitcoin)
        .map(|amount| amount.to_sat())
        .map_err(|e| ChainQueryError::invalid_response(format!("invalid BTC amount '{text}': {e}")))
}

/// Convert a JSON number holding decimal BTC into satoshis
pub fn json_btc_to_sats(value: &serde_json::Number) -> Result<u64, ChainQueryError> {
    btc_to_sats(&value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fee_bases() {
        assert_eq!(parse_fee("20000").unwrap(), 20_000);
        assert_eq!(parse_fee("0x4e20").unwrap(), 20_000);
        assert_eq!(parse_fee("0X4E20").unwrap(), 20_000);
        assert_eq!(parse_fee("0b101").unwrap(), 5);
        assert_eq!(parse_fee("0o17").unwrap(), 15);
        assert_eq!(parse_fee(" 168 ").unwrap(), 168);
        assert_eq!(parse_fee("-5").unwrap(), -5);
    }

    #[test]
    fn test_parse_fee_leading_zero_is_decimal() {
        assert_eq!(parse_fee("010").unwrap(), 10);
        assert_eq!(parse_fee("0020000").unwrap(), 20_000);
        assert!(parse_fee("1_000").is_err());
        assert!(parse_fee("0x4e_20").is_err());
    }

    #[test]
    fn test_parse_fee_rejects_garbage() {
        for bad in ["", "abc", "0x", "1.5", "--1", "0x-1", "99999999999999999999"] {
            assert!(parse_fee(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_btc_to_sats_exact() {
        assert_eq!(btc_to_sats("0.1146602").unwrap(), 11_466_020);
        assert_eq!(btc_to_sats("0.325").unwrap(), 32_500_000);
        assert_eq!(btc_to_sats("0.00001000").unwrap(), 1_000);
        assert_eq!(btc_to_sats("21000000").unwrap(), 2_100_000_000_000_000);
        assert!(btc_to_sats("0.000000001").is_err());
        assert!(btc_to_sats("-1").is_err());
    }

    #[test]
    fn test_json_number_keeps_text() {
        let value: serde_json::Value = serde_json::from_str(r#"{"value": 0.29}"#).unwrap();
        let number = match &value["value"] {
            serde_json::Value::Number(n) => n.clone(),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(json_btc_to_sats(&number).unwrap(), 29_000_000);
    }
}
