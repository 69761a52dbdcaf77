//! Rows of the transactions and labels tables, and their event mapping.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use chainstream_core::event::Event;

/// One row of `<chain>_transactions`.
///
/// Wei-denominated amounts are kept as decimal strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub hash: String,
    pub block_number: i64,
    pub from_address: String,
    pub to_address: Option<String>,
    pub gas: String,
    pub gas_price: String,
    pub input: String,
    pub nonce: i64,
    pub value: String,
    pub timestamp: i64,
}

impl TransactionRow {
    pub fn into_event(self, event_type: &str) -> Event {
        let mut data = Map::new();
        data.insert("hash".into(), Value::String(self.hash));
        data.insert("block_number".into(), Value::from(self.block_number));
        data.insert("from_address".into(), Value::String(self.from_address));
        data.insert(
            "to_address".into(),
            self.to_address.map_or(Value::Null, Value::String),
        );
        data.insert("gas".into(), Value::String(self.gas));
        data.insert("gas_price".into(), Value::String(self.gas_price));
        data.insert("input".into(), Value::String(self.input));
        data.insert("nonce".into(), Value::from(self.nonce));
        data.insert("value".into(), Value::String(self.value));
        Event::new(event_type, self.timestamp, data)
    }
}

/// One row of `<chain>_labels`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelRow {
    pub label: String,
    /// Contract address the label is attached to.
    pub address: String,
    pub transaction_hash: Option<String>,
    pub label_data: Value,
    pub block_timestamp: i64,
    pub log_index: Option<i64>,
}

impl LabelRow {
    /// `label_data.name`, if present.
    pub fn name(&self) -> Option<&str> {
        self.label_data.get("name").and_then(Value::as_str)
    }

    pub fn into_event(self, event_type: &str) -> Event {
        let mut data = Map::new();
        data.insert("label".into(), Value::String(self.label));
        data.insert("address".into(), Value::String(self.address));
        data.insert(
            "transaction_hash".into(),
            self.transaction_hash.map_or(Value::Null, Value::String),
        );
        data.insert("label_data".into(), self.label_data);
        data.insert(
            "log_index".into(),
            self.log_index.map_or(Value::Null, Value::from),
        );
        Event::new(event_type, self.block_timestamp, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transaction_event_payload() {
        let row = TransactionRow {
            hash: "0xabc".into(),
            block_number: 17,
            from_address: "0x1".into(),
            to_address: None,
            gas: "21000".into(),
            gas_price: "1000000000".into(),
            input: "0x".into(),
            nonce: 3,
            value: "1000000000000000000".into(),
            timestamp: 1500,
        };
        let ev = row.into_event("ethereum_blockchain");
        assert_eq!(ev.event_timestamp, 1500);
        assert_eq!(ev.event_data["hash"], "0xabc");
        assert_eq!(ev.event_data["to_address"], Value::Null);
        assert_eq!(ev.event_data["nonce"], 3);
        assert!(!ev.event_data.contains_key("timestamp"));
    }

    #[test]
    fn label_event_payload() {
        let row = LabelRow {
            label: "moonworm-event".into(),
            address: "0xc0".into(),
            transaction_hash: Some("0xabc".into()),
            label_data: json!({"name": "Transfer", "args": {"value": 1}}),
            block_timestamp: 1200,
            log_index: Some(4),
        };
        assert_eq!(row.name(), Some("Transfer"));
        let ev = row.into_event("ethereum_smartcontract");
        assert_eq!(ev.event_data["label_data"]["args"]["value"], 1);
        assert_eq!(ev.event_data["log_index"], 4);
    }
}
