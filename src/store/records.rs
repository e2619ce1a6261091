//! Domain record families and their row layouts.
//!
//! Every family is described by a [`FamilySpec`]: table name, ordered columns (the first one is
//! always `block_number`) and the key columns that identify a row. Identifying hash strings are
//! stored alongside a CRC32 column; keys list the CRC column first so lookups filter cheaply
//! before comparing strings.

use super::CheckpointKind;
use crate::utils::crc32;
#[cfg(test)]
use rusqlite::Row;
use rusqlite::types::Value;

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
}

const fn col(name: &'static str, sql_type: &'static str) -> Column {
    Column { name, sql_type }
}

#[derive(Debug)]
pub struct FamilySpec {
    pub table: &'static str,
    pub columns: &'static [Column],
    pub key: &'static [&'static str],
}

impl FamilySpec {
    pub fn versions_table(&self) -> String {
        format!("{}_versions", self.table)
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == column)
    }

    /// Key values extracted from a full row in column order.
    pub fn key_of(&self, row: &[Value]) -> Vec<Value> {
        self.key
            .iter()
            .filter_map(|name| self.position(name).and_then(|i| row.get(i).cloned()))
            .collect()
    }
}

static DEFINE: FamilySpec = FamilySpec {
    table: "define_cota_nft_kv_pairs",
    columns: &[
        col("block_number", "INTEGER NOT NULL"),
        col("cota_id", "TEXT NOT NULL"),
        col("cota_id_crc", "INTEGER NOT NULL"),
        col("total", "INTEGER NOT NULL"),
        col("issued", "INTEGER NOT NULL"),
        col("configure", "INTEGER NOT NULL"),
        col("lock_hash", "TEXT NOT NULL"),
        col("lock_hash_crc", "INTEGER NOT NULL"),
        col("lock_script_id", "INTEGER NOT NULL"),
    ],
    key: &["cota_id_crc", "cota_id"],
};

static HOLD: FamilySpec = FamilySpec {
    table: "hold_cota_nft_kv_pairs",
    columns: &[
        col("block_number", "INTEGER NOT NULL"),
        col("lock_hash", "TEXT NOT NULL"),
        col("lock_hash_crc", "INTEGER NOT NULL"),
        col("cota_id", "TEXT NOT NULL"),
        col("cota_id_crc", "INTEGER NOT NULL"),
        col("token_index", "INTEGER NOT NULL"),
        col("state", "INTEGER NOT NULL"),
        col("configure", "INTEGER NOT NULL"),
        col("characteristic", "TEXT NOT NULL"),
    ],
    key: &["lock_hash_crc", "lock_hash", "cota_id_crc", "cota_id", "token_index"],
};

static WITHDRAW: FamilySpec = FamilySpec {
    table: "withdraw_cota_nft_kv_pairs",
    columns: &[
        col("block_number", "INTEGER NOT NULL"),
        col("cota_id", "TEXT NOT NULL"),
        col("cota_id_crc", "INTEGER NOT NULL"),
        col("token_index", "INTEGER NOT NULL"),
        col("out_point", "TEXT NOT NULL"),
        col("out_point_crc", "INTEGER NOT NULL"),
        col("state", "INTEGER NOT NULL"),
        col("configure", "INTEGER NOT NULL"),
        col("characteristic", "TEXT NOT NULL"),
        col("receiver_lock_script_id", "INTEGER NOT NULL"),
        col("lock_hash", "TEXT NOT NULL"),
        col("lock_hash_crc", "INTEGER NOT NULL"),
        col("lock_script_id", "INTEGER NOT NULL"),
        col("version", "INTEGER NOT NULL"),
        col("tx_hash", "TEXT NOT NULL"),
    ],
    key: &["cota_id_crc", "cota_id", "token_index", "out_point_crc", "out_point"],
};

static CLAIMED: FamilySpec = FamilySpec {
    table: "claimed_cota_nft_kv_pairs",
    columns: &[
        col("block_number", "INTEGER NOT NULL"),
        col("lock_hash", "TEXT NOT NULL"),
        col("lock_hash_crc", "INTEGER NOT NULL"),
        col("cota_id", "TEXT NOT NULL"),
        col("cota_id_crc", "INTEGER NOT NULL"),
        col("token_index", "INTEGER NOT NULL"),
        col("out_point", "TEXT NOT NULL"),
        col("out_point_crc", "INTEGER NOT NULL"),
    ],
    key: &[
        "lock_hash_crc",
        "lock_hash",
        "cota_id_crc",
        "cota_id",
        "token_index",
        "out_point_crc",
        "out_point",
    ],
};

static REGISTER: FamilySpec = FamilySpec {
    table: "register_cota_kv_pairs",
    columns: &[
        col("block_number", "INTEGER NOT NULL"),
        col("lock_hash", "TEXT NOT NULL"),
        col("lock_hash_crc", "INTEGER NOT NULL"),
        col("lock_script_id", "INTEGER"),
    ],
    key: &["lock_hash_crc", "lock_hash"],
};

static ISSUER: FamilySpec = FamilySpec {
    table: "issuer_infos",
    columns: &[
        col("block_number", "INTEGER NOT NULL"),
        col("lock_hash", "TEXT NOT NULL"),
        col("lock_hash_crc", "INTEGER NOT NULL"),
        col("version", "TEXT NOT NULL"),
        col("name", "TEXT NOT NULL"),
        col("avatar", "TEXT NOT NULL"),
        col("description", "TEXT NOT NULL"),
        col("localization", "TEXT NOT NULL"),
    ],
    key: &["lock_hash_crc", "lock_hash"],
};

static CLASS: FamilySpec = FamilySpec {
    table: "class_infos",
    columns: &[
        col("block_number", "INTEGER NOT NULL"),
        col("cota_id", "TEXT NOT NULL"),
        col("cota_id_crc", "INTEGER NOT NULL"),
        col("version", "TEXT NOT NULL"),
        col("name", "TEXT NOT NULL"),
        col("symbol", "TEXT NOT NULL"),
        col("description", "TEXT NOT NULL"),
        col("image", "TEXT NOT NULL"),
        col("audio", "TEXT NOT NULL"),
        col("video", "TEXT NOT NULL"),
        col("model", "TEXT NOT NULL"),
        col("characteristic", "TEXT NOT NULL"),
        col("properties", "TEXT NOT NULL"),
        col("localization", "TEXT NOT NULL"),
    ],
    key: &["cota_id_crc", "cota_id"],
};

/// Domain record families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Define,
    Hold,
    Withdraw,
    Claimed,
    Register,
    Issuer,
    Class,
}

impl Family {
    pub const ALL: [Family; 7] = [
        Family::Define,
        Family::Hold,
        Family::Withdraw,
        Family::Claimed,
        Family::Register,
        Family::Issuer,
        Family::Class,
    ];

    pub fn spec(self) -> &'static FamilySpec {
        match self {
            Family::Define => &DEFINE,
            Family::Hold => &HOLD,
            Family::Withdraw => &WITHDRAW,
            Family::Claimed => &CLAIMED,
            Family::Register => &REGISTER,
            Family::Issuer => &ISSUER,
            Family::Class => &CLASS,
        }
    }

    /// Stream that owns the family's tables.
    pub fn stream(self) -> CheckpointKind {
        match self {
            Family::Issuer | Family::Class => CheckpointKind::Metadata,
            _ => CheckpointKind::BlockSync,
        }
    }
}

fn int(value: impl Into<i64>) -> Value {
    Value::Integer(value.into())
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn crc(value: &str) -> Value {
    int(crc32(value))
}

#[cfg(test)]
fn get_u64(row: &Row<'_>, column: &str) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(column)? as u64)
}

/// A typed row of one family.
pub trait Record: Sized {
    #[cfg(test)]
    const FAMILY: Family;

    /// Values in the family's column order.
    fn to_values(&self) -> Vec<Value>;

    #[cfg(test)]
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefineRecord {
    pub block_number: u64,
    pub cota_id: String,
    pub total: u32,
    pub issued: u32,
    pub configure: u8,
    pub lock_hash: String,
    pub lock_script_id: i64,
}

impl Record for DefineRecord {
    #[cfg(test)]
    const FAMILY: Family = Family::Define;

    fn to_values(&self) -> Vec<Value> {
        vec![
            int(self.block_number as i64),
            text(&self.cota_id),
            crc(&self.cota_id),
            int(self.total),
            int(self.issued),
            int(self.configure),
            text(&self.lock_hash),
            crc(&self.lock_hash),
            int(self.lock_script_id),
        ]
    }

    #[cfg(test)]
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            block_number: get_u64(row, "block_number")?,
            cota_id: row.get("cota_id")?,
            total: row.get("total")?,
            issued: row.get("issued")?,
            configure: row.get("configure")?,
            lock_hash: row.get("lock_hash")?,
            lock_script_id: row.get("lock_script_id")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldRecord {
    pub block_number: u64,
    pub lock_hash: String,
    pub cota_id: String,
    pub token_index: u32,
    pub state: u8,
    pub configure: u8,
    pub characteristic: String,
}

impl HoldRecord {
    pub fn key(lock_hash: &str, cota_id: &str, token_index: u32) -> RecordKey {
        RecordKey {
            family: Family::Hold,
            values: vec![
                crc(lock_hash),
                text(lock_hash),
                crc(cota_id),
                text(cota_id),
                int(token_index),
            ],
        }
    }
}

impl Record for HoldRecord {
    #[cfg(test)]
    const FAMILY: Family = Family::Hold;

    fn to_values(&self) -> Vec<Value> {
        vec![
            int(self.block_number as i64),
            text(&self.lock_hash),
            crc(&self.lock_hash),
            text(&self.cota_id),
            crc(&self.cota_id),
            int(self.token_index),
            int(self.state),
            int(self.configure),
            text(&self.characteristic),
        ]
    }

    #[cfg(test)]
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            block_number: get_u64(row, "block_number")?,
            lock_hash: row.get("lock_hash")?,
            cota_id: row.get("cota_id")?,
            token_index: row.get("token_index")?,
            state: row.get("state")?,
            configure: row.get("configure")?,
            characteristic: row.get("characteristic")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawRecord {
    pub block_number: u64,
    pub cota_id: String,
    pub token_index: u32,
    pub out_point: String,
    pub state: u8,
    pub configure: u8,
    pub characteristic: String,
    pub receiver_lock_script_id: i64,
    /// Sender lock hash.
    pub lock_hash: String,
    pub lock_script_id: i64,
    pub version: u8,
    pub tx_hash: String,
}

impl Record for WithdrawRecord {
    #[cfg(test)]
    const FAMILY: Family = Family::Withdraw;

    fn to_values(&self) -> Vec<Value> {
        vec![
            int(self.block_number as i64),
            text(&self.cota_id),
            crc(&self.cota_id),
            int(self.token_index),
            text(&self.out_point),
            crc(&self.out_point),
            int(self.state),
            int(self.configure),
            text(&self.characteristic),
            int(self.receiver_lock_script_id),
            text(&self.lock_hash),
            crc(&self.lock_hash),
            int(self.lock_script_id),
            int(self.version),
            text(&self.tx_hash),
        ]
    }

    #[cfg(test)]
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            block_number: get_u64(row, "block_number")?,
            cota_id: row.get("cota_id")?,
            token_index: row.get("token_index")?,
            out_point: row.get("out_point")?,
            state: row.get("state")?,
            configure: row.get("configure")?,
            characteristic: row.get("characteristic")?,
            receiver_lock_script_id: row.get("receiver_lock_script_id")?,
            lock_hash: row.get("lock_hash")?,
            lock_script_id: row.get("lock_script_id")?,
            version: row.get("version")?,
            tx_hash: row.get("tx_hash")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedRecord {
    pub block_number: u64,
    pub lock_hash: String,
    pub cota_id: String,
    pub token_index: u32,
    pub out_point: String,
}

impl Record for ClaimedRecord {
    #[cfg(test)]
    const FAMILY: Family = Family::Claimed;

    fn to_values(&self) -> Vec<Value> {
        vec![
            int(self.block_number as i64),
            text(&self.lock_hash),
            crc(&self.lock_hash),
            text(&self.cota_id),
            crc(&self.cota_id),
            int(self.token_index),
            text(&self.out_point),
            crc(&self.out_point),
        ]
    }

    #[cfg(test)]
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            block_number: get_u64(row, "block_number")?,
            lock_hash: row.get("lock_hash")?,
            cota_id: row.get("cota_id")?,
            token_index: row.get("token_index")?,
            out_point: row.get("out_point")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRecord {
    pub block_number: u64,
    pub lock_hash: String,
    /// Filled by a later backfill when the registering lock is not known yet.
    pub lock_script_id: Option<i64>,
}

impl Record for RegisterRecord {
    #[cfg(test)]
    const FAMILY: Family = Family::Register;

    fn to_values(&self) -> Vec<Value> {
        vec![
            int(self.block_number as i64),
            text(&self.lock_hash),
            crc(&self.lock_hash),
            self.lock_script_id.map(int).unwrap_or(Value::Null),
        ]
    }

    #[cfg(test)]
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            block_number: get_u64(row, "block_number")?,
            lock_hash: row.get("lock_hash")?,
            lock_script_id: row.get("lock_script_id")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerRecord {
    pub block_number: u64,
    pub lock_hash: String,
    pub version: String,
    pub name: String,
    pub avatar: String,
    pub description: String,
    pub localization: String,
}

impl Record for IssuerRecord {
    #[cfg(test)]
    const FAMILY: Family = Family::Issuer;

    fn to_values(&self) -> Vec<Value> {
        vec![
            int(self.block_number as i64),
            text(&self.lock_hash),
            crc(&self.lock_hash),
            text(&self.version),
            text(&self.name),
            text(&self.avatar),
            text(&self.description),
            text(&self.localization),
        ]
    }

    #[cfg(test)]
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            block_number: get_u64(row, "block_number")?,
            lock_hash: row.get("lock_hash")?,
            version: row.get("version")?,
            name: row.get("name")?,
            avatar: row.get("avatar")?,
            description: row.get("description")?,
            localization: row.get("localization")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRecord {
    pub block_number: u64,
    pub cota_id: String,
    pub version: String,
    pub name: String,
    pub symbol: String,
    pub description: String,
    pub image: String,
    pub audio: String,
    pub video: String,
    pub model: String,
    pub characteristic: String,
    pub properties: String,
    pub localization: String,
}

impl Record for ClassRecord {
    #[cfg(test)]
    const FAMILY: Family = Family::Class;

    fn to_values(&self) -> Vec<Value> {
        vec![
            int(self.block_number as i64),
            text(&self.cota_id),
            crc(&self.cota_id),
            text(&self.version),
            text(&self.name),
            text(&self.symbol),
            text(&self.description),
            text(&self.image),
            text(&self.audio),
            text(&self.video),
            text(&self.model),
            text(&self.characteristic),
            text(&self.properties),
            text(&self.localization),
        ]
    }

    #[cfg(test)]
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            block_number: get_u64(row, "block_number")?,
            cota_id: row.get("cota_id")?,
            version: row.get("version")?,
            name: row.get("name")?,
            symbol: row.get("symbol")?,
            description: row.get("description")?,
            image: row.get("image")?,
            audio: row.get("audio")?,
            video: row.get("video")?,
            model: row.get("model")?,
            characteristic: row.get("characteristic")?,
            properties: row.get("properties")?,
            localization: row.get("localization")?,
        })
    }
}

/// A record of any family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainRecord {
    Define(DefineRecord),
    Hold(HoldRecord),
    Withdraw(WithdrawRecord),
    Claimed(ClaimedRecord),
    Register(RegisterRecord),
    Issuer(IssuerRecord),
    Class(ClassRecord),
}

impl DomainRecord {
    pub fn family(&self) -> Family {
        match self {
            DomainRecord::Define(_) => Family::Define,
            DomainRecord::Hold(_) => Family::Hold,
            DomainRecord::Withdraw(_) => Family::Withdraw,
            DomainRecord::Claimed(_) => Family::Claimed,
            DomainRecord::Register(_) => Family::Register,
            DomainRecord::Issuer(_) => Family::Issuer,
            DomainRecord::Class(_) => Family::Class,
        }
    }

    pub fn to_values(&self) -> Vec<Value> {
        match self {
            DomainRecord::Define(record) => record.to_values(),
            DomainRecord::Hold(record) => record.to_values(),
            DomainRecord::Withdraw(record) => record.to_values(),
            DomainRecord::Claimed(record) => record.to_values(),
            DomainRecord::Register(record) => record.to_values(),
            DomainRecord::Issuer(record) => record.to_values(),
            DomainRecord::Class(record) => record.to_values(),
        }
    }

    pub fn key(&self) -> RecordKey {
        let family = self.family();
        RecordKey {
            family,
            values: family.spec().key_of(&self.to_values()),
        }
    }
}

macro_rules! impl_from_record {
    ($($variant:ident => $record:ty),* $(,)?) => {
        $(impl From<$record> for DomainRecord {
            fn from(record: $record) -> Self {
                DomainRecord::$variant(record)
            }
        })*
    };
}

impl_from_record!(
    Define => DefineRecord,
    Hold => HoldRecord,
    Withdraw => WithdrawRecord,
    Claimed => ClaimedRecord,
    Register => RegisterRecord,
    Issuer => IssuerRecord,
    Class => ClassRecord,
);

/// Identifier of a row, in the family's key column order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordKey {
    pub family: Family,
    pub values: Vec<Value>,
}
