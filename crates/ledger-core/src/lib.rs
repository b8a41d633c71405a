use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod chain;
pub mod constants;
pub mod error;
pub mod mine;
pub mod pow;
pub mod shared;

pub use chain::Chain;
pub use error::{InvalidTransition, LedgerError, Result};
pub use pow::CancelToken;
pub use shared::SharedChain;

use constants::{GENESIS_PREVIOUS_HASH, HASH_HEX_SIZE, HASH_SIZE, MINING_REWARD, REWARD_SENDER};

pub type Hash = [u8; HASH_SIZE];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub quantity: u64,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, quantity: u64) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            quantity,
        }
    }

    /// System-issued reward paid to whoever mined the block.
    pub fn reward(miner: impl Into<String>) -> Self {
        Self::new(REWARD_SENDER, miner, MINING_REWARD)
    }

    pub fn is_reward(&self) -> bool {
        self.sender == REWARD_SENDER
    }

    fn write_repr(&self, out: &mut String) {
        out.push_str("{'sender': ");
        push_quoted(out, &self.sender);
        out.push_str(", 'recipient': ");
        push_quoted(out, &self.recipient);
        out.push_str(", 'quantity': ");
        out.push_str(&self.quantity.to_string());
        out.push('}');
    }
}

/// Link from a block to its predecessor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PreviousHash {
    Genesis,
    Linked(String),
}

impl PreviousHash {
    /// The exact text this link contributes to the block hash preimage.
    pub fn as_str(&self) -> &str {
        match self {
            PreviousHash::Genesis => GENESIS_PREVIOUS_HASH,
            PreviousHash::Linked(hash) => hash,
        }
    }

    pub fn is_genesis(&self) -> bool {
        matches!(self, PreviousHash::Genesis)
    }
}

impl fmt::Display for PreviousHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PreviousHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PreviousHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(0) => Ok(PreviousHash::Genesis),
            Raw::Text(text) if text == GENESIS_PREVIOUS_HASH => Ok(PreviousHash::Genesis),
            Raw::Text(text)
                if text.len() == HASH_HEX_SIZE && text.bytes().all(|b| b.is_ascii_hexdigit()) =>
            {
                Ok(PreviousHash::Linked(text.to_ascii_lowercase()))
            }
            Raw::Number(n) => Err(de::Error::custom(format!(
                "previous hash must be 0 or a hex digest, got {n}"
            ))),
            Raw::Text(text) => Err(de::Error::custom(format!(
                "previous hash must be 0 or a {HASH_HEX_SIZE}-char hex digest, got {text:?}"
            ))),
        }
    }
}

/// An immutable batch of transactions linked to its predecessor by hash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub(crate) index: u64,
    #[serde(rename = "proofNumber", alias = "proof_no")]
    pub(crate) proof_number: u64,
    #[serde(rename = "previousHash", alias = "prev_hash")]
    pub(crate) previous_hash: PreviousHash,
    pub(crate) data: Vec<Transaction>,
    pub(crate) timestamp: f64,
}

impl Block {
    pub fn new(
        index: u64,
        proof_number: u64,
        previous_hash: PreviousHash,
        data: Vec<Transaction>,
        timestamp: f64,
    ) -> Self {
        Self {
            index,
            proof_number,
            previous_hash,
            data,
            timestamp,
        }
    }

    /// Rebuilds a block from a record handed over by a collaborator.
    pub fn from_record(record: serde_json::Value) -> Result<Self> {
        let block: Block = serde_json::from_value(record)
            .map_err(|e| LedgerError::MalformedRecord(e.to_string()))?;
        if !block.timestamp.is_finite() {
            return Err(LedgerError::MalformedRecord(
                "timestamp must be a finite number".to_string(),
            ));
        }
        Ok(block)
    }

    pub fn to_record(&self) -> serde_json::Value {
        serde_json::json!({
            "index": self.index,
            "proofNumber": self.proof_number,
            "previousHash": self.previous_hash.as_str(),
            "data": self.data,
            "timestamp": self.timestamp,
        })
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn proof_number(&self) -> u64 {
        self.proof_number
    }

    pub fn previous_hash(&self) -> &PreviousHash {
        &self.previous_hash
    }

    pub fn data(&self) -> &[Transaction] {
        &self.data
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// Fields concatenated in hashing order with no separators.
    pub fn hash_preimage(&self) -> String {
        format!(
            "{}{}{}{}{}",
            self.index,
            self.proof_number,
            self.previous_hash.as_str(),
            render_data(&self.data),
            format_timestamp(self.timestamp)
        )
    }

    /// Lowercase hex SHA-256 of [`Block::hash_preimage`]. Recomputed on every call.
    pub fn hash(&self) -> String {
        hex::encode(Sha256::digest(self.hash_preimage().as_bytes()))
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {} - {} - {}",
            self.index,
            self.proof_number,
            self.previous_hash,
            render_data(&self.data),
            format_timestamp(self.timestamp)
        )
    }
}

/// Renders a transaction batch as a list of single-quoted mappings,
/// e.g. `[{'sender': 'a', 'recipient': 'b', 'quantity': 5}]`.
pub fn render_data(data: &[Transaction]) -> String {
    let mut out = String::from("[");
    for (i, tx) in data.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        tx.write_repr(&mut out);
    }
    out.push(']');
    out
}

/// Shortest round-trip decimal; integral values keep a trailing `.0`.
pub fn format_timestamp(ts: f64) -> String {
    if ts.is_finite() && ts.fract() == 0.0 {
        format!("{ts:.1}")
    } else {
        format!("{ts}")
    }
}

fn push_quoted(out: &mut String, s: &str) {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || (0x7f..=0xa0).contains(&(c as u32)) => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

/// Wall clock as fractional seconds since the Unix epoch.
pub fn now_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genesis_at(ts: f64) -> Block {
        Block::new(0, 0, PreviousHash::Genesis, vec![], ts)
    }

    #[test]
    fn genesis_hash_example() {
        let genesis = genesis_at(1_600_000_000.0);
        assert_eq!(genesis.hash_preimage(), "000[]1600000000.0");
        assert_eq!(
            genesis.hash(),
            "58e91ccb559490dde2930ab5f29a1066bf78d79f19e5c52d6bc519e5da4dab6d"
        );
    }

    #[test]
    fn block_hash_example() {
        let genesis = genesis_at(1_600_000_000.0);
        let block = Block::new(
            1,
            69732,
            PreviousHash::Linked(genesis.hash()),
            vec![Transaction::new("alice", "bob", 5), Transaction::reward("m1")],
            1_600_000_001.5,
        );
        assert_eq!(
            block.hash(),
            "eb1bb6c50fd62459b769fdeb785a2ed1601098be7d77430cc2d3021d664ff7ee"
        );
    }

    #[test]
    fn block_hash_consistency() {
        let block = Block::new(
            3,
            42,
            PreviousHash::Linked("ab".repeat(32)),
            vec![Transaction::new("alice", "bob", 10)],
            1_700_000_000.25,
        );
        assert_eq!(block.hash(), block.hash());
        assert_eq!(block.hash().len(), HASH_HEX_SIZE);
    }

    #[test]
    fn block_hash_changes_with_data() {
        let mut block = Block::new(
            1,
            7,
            PreviousHash::Genesis,
            vec![Transaction::new("alice", "bob", 10)],
            1_700_000_000.0,
        );
        let before = block.hash();
        block.data[0].quantity = 11;
        assert_ne!(before, block.hash());
    }

    #[test]
    fn render_data_matches_reference_layout() {
        let data = vec![Transaction::new("alice", "bob", 5), Transaction::reward("m1")];
        assert_eq!(
            render_data(&data),
            "[{'sender': 'alice', 'recipient': 'bob', 'quantity': 5}, \
             {'sender': '0', 'recipient': 'm1', 'quantity': 1}]"
        );
        assert_eq!(render_data(&[]), "[]");
    }

    #[test]
    fn quoting_rules() {
        let mut out = String::new();
        push_quoted(&mut out, "it's");
        assert_eq!(out, "\"it's\"");

        out.clear();
        push_quoted(&mut out, "say \"hi\"");
        assert_eq!(out, "'say \"hi\"'");

        out.clear();
        push_quoted(&mut out, "both ' \"");
        assert_eq!(out, "'both \\' \"'");

        out.clear();
        push_quoted(&mut out, "a\nb\\");
        assert_eq!(out, "'a\\nb\\\\'");
    }

    #[test]
    fn timestamp_formatting() {
        assert_eq!(format_timestamp(1_600_000_000.0), "1600000000.0");
        assert_eq!(format_timestamp(1_600_000_001.5), "1600000001.5");
        assert_eq!(format_timestamp(0.1), "0.1");
    }

    #[test]
    fn display_lists_fields_in_order() {
        let genesis = genesis_at(1_600_000_000.0);
        assert_eq!(genesis.to_string(), "0 - 0 - 0 - [] - 1600000000.0");
    }

    #[test]
    fn record_round_trip_keeps_hash() {
        let block = Block::new(
            2,
            23263,
            PreviousHash::Linked("0f".repeat(32)),
            vec![Transaction::new("carol", "dave", 3)],
            1_700_000_123.456,
        );
        let rebuilt = Block::from_record(block.to_record()).unwrap();
        assert_eq!(rebuilt, block);
        assert_eq!(rebuilt.hash(), block.hash());
    }

    #[test]
    fn record_accepts_reference_field_names() {
        let record = serde_json::json!({
            "index": 0,
            "proof_no": 0,
            "prev_hash": 0,
            "data": [],
            "timestamp": 1_600_000_000.0,
        });
        let block = Block::from_record(record).unwrap();
        assert!(block.previous_hash().is_genesis());
        assert_eq!(block.hash(), genesis_at(1_600_000_000.0).hash());
    }

    #[test]
    fn record_missing_field_is_malformed() {
        let record = serde_json::json!({
            "index": 1,
            "proofNumber": 5,
            "data": [],
            "timestamp": 1.0,
        });
        let err = Block::from_record(record).unwrap_err();
        assert!(matches!(err, LedgerError::MalformedRecord(ref msg) if msg.contains("previousHash")));
    }

    #[test]
    fn record_with_bad_hash_is_malformed() {
        let record = serde_json::json!({
            "index": 1,
            "proofNumber": 5,
            "previousHash": "not-a-hash",
            "data": [],
            "timestamp": 1.0,
        });
        assert!(matches!(
            Block::from_record(record),
            Err(LedgerError::MalformedRecord(_))
        ));
    }

    #[test]
    fn record_with_bad_transaction_is_malformed() {
        let record = serde_json::json!({
            "index": 1,
            "proofNumber": 5,
            "previousHash": "0",
            "data": [{"sender": "alice", "quantity": 2}],
            "timestamp": 1.0,
        });
        assert!(matches!(
            Block::from_record(record),
            Err(LedgerError::MalformedRecord(_))
        ));
    }

    #[test]
    fn uppercase_previous_hash_is_normalised() {
        let hash: PreviousHash = serde_json::from_value(serde_json::json!("AB".repeat(32))).unwrap();
        assert_eq!(hash, PreviousHash::Linked("ab".repeat(32)));
    }

    #[test]
    fn reward_transaction_shape() {
        let tx = Transaction::reward("m1");
        assert_eq!(tx, Transaction::new("0", "m1", 1));
        assert!(tx.is_reward());
    }

    #[test]
    fn transaction_serialization_example() {
        let tx = Transaction::new("alice", "bob", 10);
        let json = serde_json::to_string(&tx).unwrap();
        assert_eq!(json, r#"{"sender":"alice","recipient":"bob","quantity":10}"#);
    }
}
