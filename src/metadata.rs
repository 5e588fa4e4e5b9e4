//! Loads transaction metadata: `{ "transactions_order": [...], "transactions": {...} }`.
//! The victim transaction is the last entry of `transactions_order`.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::Error;
use crate::hexstring::HexString;

#[derive(Debug, Clone, Deserialize)]
struct RawTransaction {
    from: String,
    to: String,
    input: String,
    value: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawMetadata {
    transactions_order: Vec<String>,
    transactions: HashMap<String, RawTransaction>,
}

/// The subset of a transaction's fields needed to seed the root call context.
#[derive(Debug, Clone)]
pub struct TransactionMetadata {
    pub hash: String,
    pub from: HexString,
    pub to: HexString,
    pub input: HexString,
    pub value: HexString,
}

/// Parses `contents` and returns the victim transaction - the last entry of
/// `transactions_order`.
pub fn load_victim_transaction(contents: &str) -> Result<TransactionMetadata, Error> {
    let raw: RawMetadata =
        serde_json::from_str(contents).map_err(|e| Error::MalformedMetadata(e.to_string()))?;

    let hash = raw
        .transactions_order
        .last()
        .cloned()
        .ok_or_else(|| Error::MalformedMetadata("transactions_order is empty".to_string()))?;

    let tx = raw
        .transactions
        .get(&hash)
        .ok_or_else(|| Error::MalformedMetadata(format!("no transaction entry for {hash}")))?;

    Ok(TransactionMetadata {
        hash,
        from: HexString::new(&tx.from).map_err(|_| Error::MalformedMetadata(format!("bad from: {}", tx.from)))?,
        to: HexString::new(&tx.to).map_err(|_| Error::MalformedMetadata(format!("bad to: {}", tx.to)))?,
        input: HexString::new(&tx.input)
            .map_err(|_| Error::MalformedMetadata(format!("bad input: {}", tx.input)))?,
        value: HexString::new(&tx.value)
            .map_err(|_| Error::MalformedMetadata(format!("bad value: {}", tx.value)))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "transactions_order": ["0xaaa", "0xbbb"],
        "transactions": {
            "0xaaa": {"from": "0x01", "to": "0x02", "input": "0x", "value": "0x0"},
            "0xbbb": {"from": "0x03", "to": "0x04", "input": "0xdead", "value": "0x5"}
        }
    }"#;

    #[test]
    fn picks_the_last_transaction_in_order() {
        let tx = load_victim_transaction(SAMPLE).unwrap();
        assert_eq!(tx.hash, "0xbbb");
        assert_eq!(tx.from, HexString::new("0x03").unwrap());
        assert_eq!(tx.input, HexString::new("0xdead").unwrap());
    }

    #[test]
    fn empty_order_is_malformed() {
        let err = load_victim_transaction(r#"{"transactions_order": [], "transactions": {}}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedMetadata(_)));
    }

    #[test]
    fn missing_transaction_entry_is_malformed() {
        let err = load_victim_transaction(
            r#"{"transactions_order": ["0xccc"], "transactions": {}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedMetadata(_)));
    }
}
