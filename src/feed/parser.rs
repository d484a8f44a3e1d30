//! Raw feed record parsing
//!
//! Turns one untyped feed record into a [`Coin`]. Pure: verification is
//! attached later by the pipeline.
//!
//! Defaults for absent fields: name `Unknown`, symbol `UNK`, creator the zero
//! address, migration time `now`, numeric fields `0`. Present but malformed
//! values are errors for that record only.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::address::Address;
use crate::coin::{Coin, TransactionRecord, TxDirection};
use crate::error::{Error, Result};

pub const DEFAULT_NAME: &str = "Unknown";
pub const DEFAULT_SYMBOL: &str = "UNK";

/// Unix timestamps above this are taken as milliseconds
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Parse a migration record
pub fn parse_coin(raw: &Value, now: DateTime<Utc>) -> Result<Coin> {
    let record = raw
        .as_object()
        .ok_or_else(|| Error::Parse(format!("record is not an object: {}", truncate(raw))))?;

    let contract_raw = record
        .get("contractAddress")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let contract_address = Address::parse(contract_raw)?;

    let token = record.get("token");
    let name = string_field(token, "name").unwrap_or_else(|| DEFAULT_NAME.to_string());
    let symbol = string_field(token, "symbol").unwrap_or_else(|| DEFAULT_SYMBOL.to_string());

    let creator = match record.get("creator") {
        None | Some(Value::Null) => Address::zero(),
        Some(Value::String(s)) => Address::parse(s)?,
        Some(other) => {
            return Err(Error::AddressFormat {
                address: other.to_string(),
                reason: "creator is not a string".to_string(),
            })
        }
    };

    let migration_time = match record.get("migrationTime") {
        None | Some(Value::Null) => now,
        Some(value) => parse_timestamp(value)?,
    };

    Ok(Coin {
        contract_address,
        name,
        symbol,
        creator,
        migration_time,
        initial_liquidity: number_field(record.get("initialLiquidity"), "initialLiquidity")?,
        creator_fee: number_field(record.get("feePercentage"), "feePercentage")?,
        holders: count_field(record.get("holderCount"), "holderCount")?,
        is_verified: false,
    })
}

/// Parse one trade row belonging to `contract`
pub fn parse_transaction(raw: &Value, contract: &Address) -> Result<TransactionRecord> {
    let record = raw
        .as_object()
        .ok_or_else(|| Error::Parse(format!("trade is not an object: {}", truncate(raw))))?;

    let tx_hash = record
        .get("txHash")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Parse("trade without txHash".to_string()))?
        .to_string();

    let direction_raw = record
        .get("direction")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let direction = TxDirection::parse(direction_raw)
        .ok_or_else(|| Error::Parse(format!("unknown trade direction '{}'", direction_raw)))?;

    let timestamp = match record.get("timestamp") {
        None | Some(Value::Null) => return Err(Error::Parse(format!("trade {} without timestamp", tx_hash))),
        Some(value) => parse_timestamp(value)?,
    };

    Ok(TransactionRecord {
        contract_address: *contract,
        tx_hash,
        direction,
        amount_eth: number_field(record.get("amountEth"), "amountEth")?,
        gas_price: number_field(record.get("gasPrice"), "gasPrice")?,
        block_number: count_field(record.get("blockNumber"), "blockNumber")?,
        timestamp,
    })
}

fn string_field(parent: Option<&Value>, key: &str) -> Option<String> {
    parent
        .and_then(|p| p.get(key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Float that may arrive as a JSON number or a numeric string
fn number_field(value: Option<&Value>, field: &str) -> Result<f64> {
    let parsed = match value {
        None | Some(Value::Null) => return Ok(0.0),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(Error::Parse(format!(
            "{} is not a number: {}",
            field,
            value.map(truncate).unwrap_or_default()
        ))),
    }
}

/// Non-negative integer that may arrive as a JSON number or a numeric string
fn count_field(value: Option<&Value>, field: &str) -> Result<u64> {
    let parsed = match value {
        None | Some(Value::Null) => return Ok(0),
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(_) => None,
    };

    parsed.ok_or_else(|| {
        Error::Parse(format!(
            "{} is not a non-negative integer: {}",
            field,
            value.map(truncate).unwrap_or_default()
        ))
    })
}

/// ISO-8601 (with or without offset) or unix seconds/milliseconds
fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(t) = DateTime::parse_from_rfc3339(s) {
                return Ok(t.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Ok(Utc.from_utc_datetime(&naive));
                }
            }
            Err(Error::Parse(format!("unparsable timestamp '{}'", s)))
        }
        Value::Number(n) => {
            let raw = n
                .as_i64()
                .ok_or_else(|| Error::Parse(format!("unparsable timestamp {}", n)))?;
            let parsed = if raw.abs() >= MILLIS_THRESHOLD {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            };
            parsed.ok_or_else(|| Error::Parse(format!("timestamp out of range: {}", raw)))
        }
        other => Err(Error::Parse(format!("unparsable timestamp {}", truncate(other)))),
    }
}

fn truncate(value: &Value) -> String {
    let mut s = value.to_string();
    if s.len() > 120 {
        let mut end = 120;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
        s.push_str("...");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CONTRACT: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
    const CREATOR: &str = "0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359";

    #[test]
    fn test_full_record() {
        let now = Utc::now();
        let raw = json!({
            "contractAddress": CONTRACT,
            "token": { "name": "Pepe Two", "symbol": "PEPE2" },
            "creator": CREATOR,
            "migrationTime": "2024-05-01T12:00:00",
            "initialLiquidity": 12.5,
            "feePercentage": "2",
            "holderCount": 77
        });

        let coin = parse_coin(&raw, now).unwrap();
        assert_eq!(coin.contract_address.to_string(), "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
        assert_eq!(coin.creator.to_string(), "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359");
        assert_eq!(coin.name, "Pepe Two");
        assert_eq!(coin.symbol, "PEPE2");
        assert_eq!(coin.initial_liquidity, 12.5);
        assert_eq!(coin.creator_fee, 2.0);
        assert_eq!(coin.holders, 77);
        assert_eq!(
            coin.migration_time,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
        );
        assert!(!coin.is_verified);
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let now = Utc::now();
        let coin = parse_coin(&json!({ "contractAddress": CONTRACT }), now).unwrap();
        assert_eq!(coin.name, DEFAULT_NAME);
        assert_eq!(coin.symbol, DEFAULT_SYMBOL);
        assert!(coin.creator.is_zero());
        assert_eq!(coin.migration_time, now);
        assert_eq!(coin.initial_liquidity, 0.0);
        assert_eq!(coin.creator_fee, 0.0);
        assert_eq!(coin.holders, 0);
    }

    #[test]
    fn test_bad_addresses_fail() {
        let now = Utc::now();
        assert!(matches!(
            parse_coin(&json!({}), now),
            Err(Error::AddressFormat { .. })
        ));
        assert!(matches!(
            parse_coin(&json!({ "contractAddress": "0x123" }), now),
            Err(Error::AddressFormat { .. })
        ));
        assert!(matches!(
            parse_coin(&json!({ "contractAddress": CONTRACT, "creator": "bob" }), now),
            Err(Error::AddressFormat { .. })
        ));
    }

    #[test]
    fn test_malformed_values_fail() {
        let now = Utc::now();
        assert!(matches!(
            parse_coin(&json!({ "contractAddress": CONTRACT, "holderCount": -4 }), now),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            parse_coin(&json!({ "contractAddress": CONTRACT, "initialLiquidity": "lots" }), now),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            parse_coin(&json!({ "contractAddress": CONTRACT, "migrationTime": "yesterday" }), now),
            Err(Error::Parse(_))
        ));
        assert!(matches!(parse_coin(&json!([1, 2]), now), Err(Error::Parse(_))));
    }

    #[test]
    fn test_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp(&json!("2024-05-01T14:00:00+02:00")).unwrap(), expected);
        assert_eq!(parse_timestamp(&json!("2024-05-01 12:00:00")).unwrap(), expected);
        assert_eq!(parse_timestamp(&json!(expected.timestamp())).unwrap(), expected);
        assert_eq!(
            parse_timestamp(&json!(expected.timestamp_millis())).unwrap(),
            expected
        );
    }

    #[test]
    fn test_parse_transaction() {
        let contract = Address::parse(CONTRACT).unwrap();
        let tx = parse_transaction(
            &json!({
                "txHash": "0xabc",
                "direction": "SELL",
                "amountEth": "0.25",
                "gasPrice": 31.5,
                "blockNumber": 19000000,
                "timestamp": "2024-05-01T12:00:00Z"
            }),
            &contract,
        )
        .unwrap();
        assert_eq!(tx.direction, TxDirection::Sell);
        assert_eq!(tx.amount_eth, 0.25);
        assert_eq!(tx.block_number, 19_000_000);

        assert!(parse_transaction(&json!({ "direction": "buy" }), &contract).is_err());
    }
}
