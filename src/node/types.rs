//! Types for CKB node JSON-RPC integration

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Script hash type as reported by the node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ScriptHashType {
    Data,
    Type,
    Data1,
    Data2,
}

impl ScriptHashType {
    /// Byte used for this hash type in the molecule encoding of a script.
    pub fn as_byte(&self) -> u8 {
        match self {
            ScriptHashType::Data => 0,
            ScriptHashType::Type => 1,
            ScriptHashType::Data1 => 2,
            ScriptHashType::Data2 => 4,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ScriptHashType::Data),
            1 => Some(ScriptHashType::Type),
            2 => Some(ScriptHashType::Data1),
            4 => Some(ScriptHashType::Data2),
            _ => None,
        }
    }
}

/// A lock or type script.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Script {
    #[serde(with = "hex_bytes")]
    pub code_hash: Vec<u8>,
    pub hash_type: ScriptHashType,
    #[serde(with = "hex_bytes")]
    pub args: Vec<u8>,
}

/// Reference to a previous transaction output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutPoint {
    #[serde(with = "hex_bytes")]
    pub tx_hash: Vec<u8>,
    #[serde(with = "hex_u32")]
    pub index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellInput {
    pub previous_output: OutPoint,
    #[serde(with = "hex_u64")]
    pub since: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellOutput {
    #[serde(with = "hex_u64")]
    pub capacity: u64,
    pub lock: Script,
    #[serde(rename = "type")]
    pub type_: Option<Script>,
}

/// A transaction as returned inside a block or by `get_transaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(with = "hex_bytes")]
    pub hash: Vec<u8>,
    pub inputs: Vec<CellInput>,
    pub outputs: Vec<CellOutput>,
    #[serde(with = "hex_bytes_vec")]
    pub outputs_data: Vec<Vec<u8>>,
    #[serde(with = "hex_bytes_vec")]
    pub witnesses: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    #[serde(with = "hex_u64")]
    pub number: u64,
    #[serde(with = "hex_bytes")]
    pub hash: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub parent_hash: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
}

/// Envelope of the `get_transaction` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionWithStatus {
    pub transaction: Option<Transaction>,
}

/// Subset of `get_blockchain_info` the syncer needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainInfo {
    /// Chain name, `ckb` on mainnet.
    pub chain: String,
}

impl ChainInfo {
    pub fn is_mainnet(&self) -> bool {
        self.chain == "ckb"
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// Error types for node operations
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("RPC error {code}: {message}")]
    RpcError { code: i64, message: String },

    #[error("No data returned for {0}")]
    NoData(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

fn strip_hex_prefix(value: &str) -> &str {
    value.strip_prefix("0x").unwrap_or(value)
}

pub(crate) mod hex_u64 {
    use super::*;

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:#x}", value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        u64::from_str_radix(strip_hex_prefix(&raw), 16).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod hex_u32 {
    use super::*;

    pub fn serialize<S: Serializer>(value: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:#x}", value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let raw = String::deserialize(deserializer)?;
        u32::from_str_radix(strip_hex_prefix(&raw), 16).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod hex_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(value)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        hex::decode(strip_hex_prefix(&raw)).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod hex_bytes_vec {
    use super::*;

    pub fn serialize<S: Serializer>(values: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let encoded: Vec<String> = values
            .iter()
            .map(|value| format!("0x{}", hex::encode(value)))
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|value| hex::decode(strip_hex_prefix(value)).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK_JSON: &str = r#"{
        "header": {
            "number": "0x3e8",
            "hash": "0xaa00000000000000000000000000000000000000000000000000000000000000",
            "parent_hash": "0xbb00000000000000000000000000000000000000000000000000000000000000",
            "timestamp": "0x17f0bd1b4c1"
        },
        "transactions": [{
            "hash": "0x01",
            "version": "0x0",
            "cell_deps": [],
            "header_deps": [],
            "inputs": [{"previous_output": {"tx_hash": "0x02", "index": "0x1"}, "since": "0x0"}],
            "outputs": [{
                "capacity": "0x174876e800",
                "lock": {"code_hash": "0x03", "hash_type": "type", "args": "0x"},
                "type": null
            }],
            "outputs_data": ["0x"],
            "witnesses": ["0x55000000"]
        }]
    }"#;

    #[test]
    fn deserializes_node_block() {
        let block: Block = serde_json::from_str(BLOCK_JSON).unwrap();
        assert_eq!(block.header.number, 1000);
        assert_eq!(block.header.parent_hash[0], 0xbb);

        let tx = &block.transactions[0];
        assert_eq!(tx.hash, vec![0x01]);
        assert_eq!(tx.inputs[0].previous_output.index, 1);
        assert_eq!(tx.outputs[0].lock.hash_type, ScriptHashType::Type);
        assert!(tx.outputs[0].type_.is_none());
        assert!(tx.outputs_data[0].is_empty());
        assert_eq!(tx.witnesses[0], vec![0x55, 0, 0, 0]);
    }

    #[test]
    fn hash_type_bytes_round_trip() {
        for hash_type in [
            ScriptHashType::Data,
            ScriptHashType::Type,
            ScriptHashType::Data1,
            ScriptHashType::Data2,
        ] {
            assert_eq!(ScriptHashType::from_byte(hash_type.as_byte()), Some(hash_type));
        }
        assert_eq!(ScriptHashType::from_byte(3), None);
    }
}
