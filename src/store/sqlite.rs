//! SQLite implementation of the [`Store`] trait.
//!
//! One rusqlite connection sits behind a mutex and every operation runs on the blocking pool.
//! Version rows are written by explicit read-modify-write inside the block
//! transaction; nothing relies on triggers.

#[cfg(test)]
use super::records::Record;
use super::records::{Family, FamilySpec};
use super::schema;
use super::{
    ActionType, BlockMutations, Checkpoint, CheckpointKind, Mutation, ScriptRegistry, Store,
    StoreError,
};
use crate::node::Script;
use crate::utils::crc32;

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Transaction, params, params_from_iter};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// SQLite-backed versioned store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

/// A version row read back from a `<family>_versions` table.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionRecord {
    pub id: i64,
    pub family: Family,
    pub block_number: u64,
    pub tx_index: u32,
    pub action: ActionType,
    /// Full prior row in column order, absent for creates.
    pub old: Option<Vec<Value>>,
    /// Full new row in column order, absent for deletes.
    pub new: Option<Vec<Value>>,
}

#[cfg(test)]
impl VersionRecord {
    pub fn old_value(&self, column: &str) -> Option<&Value> {
        let at = self.family.spec().position(column)?;
        self.old.as_ref()?.get(at)
    }

    pub fn new_value(&self, column: &str) -> Option<&Value> {
        let at = self.family.spec().position(column)?;
        self.new.as_ref()?.get(at)
    }
}

impl SqliteStore {
    /// Open (or create) a database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` on the blocking pool with exclusive access to the connection.
    async fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::TaskJoin(e.to_string()))?
    }
}

/// Inspection queries.
#[cfg(test)]
impl SqliteStore {
    /// All current rows of a family, in insertion order.
    pub async fn records<R: Record + Send + 'static>(&self) -> Result<Vec<R>, StoreError> {
        self.with_conn(|conn| {
            let spec = R::FAMILY.spec();
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM {} ORDER BY id", column_list(spec, ""), spec.table))?;
            let rows = stmt
                .query_map([], |row| R::from_row(row))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }

    /// Version rows written while processing `block_number`, in write order.
    pub async fn versions(
        &self,
        family: Family,
        block_number: u64,
    ) -> Result<Vec<VersionRecord>, StoreError> {
        self.with_conn(move |conn| read_versions(conn, family, block_number, false))
            .await
    }

    /// Checkpoint history of a stream, oldest first.
    pub async fn checkpoints(&self, kind: CheckpointKind) -> Result<Vec<Checkpoint>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT block_number, block_hash FROM check_infos
                 WHERE check_type = ?1 ORDER BY block_number",
            )?;
            let rows = stmt
                .query_map(params![kind.as_i64()], |row| checkpoint_from_row(kind, row))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }
}

fn column_list(spec: &FamilySpec, prefix: &str) -> String {
    spec.columns
        .iter()
        .map(|column| format!("{}{}", prefix, column.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn key_clause(spec: &FamilySpec, first_param: usize) -> String {
    spec.key
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{} = ?{}", name, first_param + i))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn describe_key(key: &[Value]) -> String {
    key.iter()
        .filter_map(|value| match value {
            Value::Text(text) => Some(text.clone()),
            Value::Integer(number) => Some(number.to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn checkpoint_from_row(kind: CheckpointKind, row: &rusqlite::Row<'_>) -> rusqlite::Result<Checkpoint> {
    let block_hash: String = row.get(1)?;
    let block_hash = hex::decode(&block_hash).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Checkpoint {
        kind,
        block_number: row.get::<_, i64>(0)? as u64,
        block_hash,
    })
}

fn latest_checkpoint(conn: &Connection, kind: CheckpointKind) -> rusqlite::Result<Option<Checkpoint>> {
    conn.query_row(
        "SELECT block_number, block_hash FROM check_infos
         WHERE check_type = ?1 ORDER BY block_number DESC LIMIT 1",
        params![kind.as_i64()],
        |row| checkpoint_from_row(kind, row),
    )
    .optional()
}

fn select_row(conn: &Connection, spec: &FamilySpec, key: &[Value]) -> rusqlite::Result<Option<Vec<Value>>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {}",
        column_list(spec, ""),
        spec.table,
        key_clause(spec, 1)
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    stmt.query_row(params_from_iter(key.iter()), |row| {
        (0..spec.columns.len())
            .map(|i| row.get::<_, Value>(i))
            .collect::<rusqlite::Result<Vec<_>>>()
    })
    .optional()
}

fn insert_row(conn: &Connection, spec: &FamilySpec, values: &[Value]) -> rusqlite::Result<()> {
    let placeholders = (1..=values.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        spec.table,
        column_list(spec, ""),
        placeholders
    );
    conn.prepare_cached(&sql)?
        .execute(params_from_iter(values.iter()))?;
    Ok(())
}

fn update_row(conn: &Connection, spec: &FamilySpec, key: &[Value], values: &[Value]) -> rusqlite::Result<()> {
    let assignments = spec
        .columns
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{} = ?{}", column.name, i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        spec.table,
        assignments,
        key_clause(spec, values.len() + 1)
    );
    conn.prepare_cached(&sql)?
        .execute(params_from_iter(values.iter().chain(key.iter())))?;
    Ok(())
}

fn delete_row(conn: &Connection, spec: &FamilySpec, key: &[Value]) -> rusqlite::Result<usize> {
    let sql = format!("DELETE FROM {} WHERE {}", spec.table, key_clause(spec, 1));
    conn.prepare_cached(&sql)?
        .execute(params_from_iter(key.iter()))
}

fn insert_version(
    conn: &Connection,
    spec: &FamilySpec,
    block_number: u64,
    tx_index: u32,
    action: ActionType,
    old: Option<&[Value]>,
    new: Option<&[Value]>,
) -> rusqlite::Result<()> {
    let width = spec.columns.len();
    let side = |row: Option<&[Value]>| -> Vec<Value> {
        row.map(<[Value]>::to_vec)
            .unwrap_or_else(|| vec![Value::Null; width])
    };
    let old = side(old);
    let new = side(new);

    let mut columns = vec![
        "block_number".to_string(),
        "tx_index".to_string(),
        "action_type".to_string(),
        "old_block_number".to_string(),
        "new_block_number".to_string(),
    ];
    let mut values = vec![
        Value::Integer(block_number as i64),
        Value::Integer(tx_index as i64),
        Value::Integer(action.as_i64()),
        old[0].clone(),
        new[0].clone(),
    ];
    for i in 1..width {
        columns.push(format!("old_{}", spec.columns[i].name));
        values.push(old[i].clone());
        columns.push(format!("new_{}", spec.columns[i].name));
        values.push(new[i].clone());
    }

    let placeholders = (1..=values.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        spec.versions_table(),
        columns.join(", "),
        placeholders
    );
    conn.prepare_cached(&sql)?
        .execute(params_from_iter(values.iter()))?;
    Ok(())
}

fn read_versions(
    conn: &Connection,
    family: Family,
    block_number: u64,
    newest_first: bool,
) -> Result<Vec<VersionRecord>, StoreError> {
    let spec = family.spec();
    let width = spec.columns.len();
    let table = spec.versions_table();

    let side_columns = |prefix: &str| {
        std::iter::once(format!("{}block_number", prefix))
            .chain(spec.columns[1..].iter().map(|c| format!("{}{}", prefix, c.name)))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let sql = format!(
        "SELECT id, tx_index, action_type, {}, {} FROM {} WHERE block_number = ?1 ORDER BY id {}",
        side_columns("old_"),
        side_columns("new_"),
        table,
        if newest_first { "DESC" } else { "ASC" }
    );

    let mut stmt = conn.prepare(&sql)?;
    let raw = stmt
        .query_map(params![block_number as i64], |row| {
            let id: i64 = row.get(0)?;
            let tx_index: i64 = row.get(1)?;
            let action: i64 = row.get(2)?;
            let values = (0..width * 2)
                .map(|i| row.get::<_, Value>(3 + i))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok((id, tx_index, action, values))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    raw.into_iter()
        .map(|(id, tx_index, action, mut values)| {
            let action = ActionType::from_i64(action).ok_or_else(|| StoreError::CorruptVersion {
                table: table.clone(),
                id,
            })?;
            let new = values.split_off(width);
            let old = values;
            Ok(VersionRecord {
                id,
                family,
                block_number,
                tx_index: tx_index as u32,
                action,
                old: (action != ActionType::Create).then_some(old),
                new: (action != ActionType::Delete).then_some(new),
            })
        })
        .collect()
}

fn missing(spec: &FamilySpec, key: &[Value]) -> StoreError {
    StoreError::MissingRecord {
        table: spec.table,
        key: describe_key(key),
    }
}

fn apply_block_tx(tx: &Transaction<'_>, batch: &BlockMutations) -> Result<(), StoreError> {
    let kind = batch.checkpoint.kind;
    let block_number = batch.checkpoint.block_number;

    let mut ordered: Vec<_> = batch.mutations.iter().collect();
    // stable: keeps producer order within a transaction
    ordered.sort_by_key(|m| m.tx_index);

    for tx_mutation in ordered {
        let family = tx_mutation.mutation.family();
        if family.stream() != kind {
            return Err(StoreError::StreamMismatch {
                family,
                stream: kind.name(),
            });
        }
        let spec = family.spec();
        let tx_index = tx_mutation.tx_index;

        match &tx_mutation.mutation {
            Mutation::Create(record) => {
                let values = record.to_values();
                insert_row(tx, spec, &values)?;
                insert_version(tx, spec, block_number, tx_index, ActionType::Create, None, Some(&values))?;
            }
            Mutation::Update(record) => {
                let values = record.to_values();
                let key = spec.key_of(&values);
                let prior = select_row(tx, spec, &key)?.ok_or_else(|| missing(spec, &key))?;
                insert_version(tx, spec, block_number, tx_index, ActionType::Update, Some(&prior), Some(&values))?;
                update_row(tx, spec, &key, &values)?;
            }
            Mutation::Upsert(record) => {
                let values = record.to_values();
                let key = spec.key_of(&values);
                match select_row(tx, spec, &key)? {
                    Some(prior) => {
                        insert_version(tx, spec, block_number, tx_index, ActionType::Update, Some(&prior), Some(&values))?;
                        update_row(tx, spec, &key, &values)?;
                    }
                    None => {
                        insert_row(tx, spec, &values)?;
                        insert_version(tx, spec, block_number, tx_index, ActionType::Create, None, Some(&values))?;
                    }
                }
            }
            Mutation::Delete(key) => {
                let prior = select_row(tx, spec, &key.values)?
                    .ok_or_else(|| missing(spec, &key.values))?;
                insert_version(tx, spec, block_number, tx_index, ActionType::Delete, Some(&prior), None)?;
                delete_row(tx, spec, &key.values)?;
            }
        }
    }

    tx.execute(
        "INSERT INTO check_infos (check_type, block_number, block_hash, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            kind.as_i64(),
            block_number as i64,
            hex::encode(&batch.checkpoint.block_hash),
            chrono::Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn has_parent_checkpoint(conn: &Connection, kind: CheckpointKind, block_number: u64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM check_infos WHERE check_type = ?1 AND block_number < ?2)",
        params![kind.as_i64(), block_number as i64],
        |row| row.get(0),
    )
}

/// Whether blocks below `block_number` left committed rows in the stream's families.
fn has_older_versions(conn: &Connection, kind: CheckpointKind, block_number: u64) -> rusqlite::Result<bool> {
    for family in kind.families() {
        let found: bool = conn.query_row(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE block_number < ?1)",
                family.spec().versions_table()
            ),
            params![block_number as i64],
            |row| row.get(0),
        )?;
        if found {
            return Ok(true);
        }
    }
    Ok(false)
}

fn rollback_block_tx(tx: &Transaction<'_>, kind: CheckpointKind, block_number: u64) -> Result<usize, StoreError> {
    let latest = latest_checkpoint(tx, kind)?.map(|c| c.block_number);
    if latest != Some(block_number) {
        return Err(StoreError::RollbackOutOfOrder {
            requested: block_number,
            latest,
        });
    }

    if !has_parent_checkpoint(tx, kind, block_number)? && has_older_versions(tx, kind, block_number)? {
        return Err(StoreError::ForkBeyondHistory { block_number });
    }

    let mut replayed = 0;
    for family in kind.families() {
        let spec = family.spec();
        // newest first so repeated changes to one key unwind to the oldest prior row
        for version in read_versions(tx, family, block_number, true)? {
            match (&version.action, &version.old, &version.new) {
                (ActionType::Create, _, Some(new)) => {
                    delete_row(tx, spec, &spec.key_of(new))?;
                }
                (ActionType::Update, Some(old), Some(new)) => {
                    delete_row(tx, spec, &spec.key_of(new))?;
                    insert_row(tx, spec, old)?;
                }
                (ActionType::Delete, Some(old), _) => {
                    insert_row(tx, spec, old)?;
                }
                _ => {
                    return Err(StoreError::CorruptVersion {
                        table: spec.versions_table(),
                        id: version.id,
                    });
                }
            }
            replayed += 1;
        }
        tx.execute(
            &format!("DELETE FROM {} WHERE block_number = ?1", spec.versions_table()),
            params![block_number as i64],
        )?;
    }

    tx.execute(
        "DELETE FROM check_infos WHERE check_type = ?1 AND block_number = ?2",
        params![kind.as_i64(), block_number as i64],
    )?;
    Ok(replayed)
}

#[async_trait::async_trait]
impl ScriptRegistry for SqliteStore {
    async fn find_or_create_script(&self, script: &Script) -> Result<i64, StoreError> {
        let code_hash = hex::encode(&script.code_hash);
        let args = hex::encode(&script.args);
        let hash_type = script.hash_type.as_byte() as i64;

        self.with_conn(move |conn| {
            let code_hash_crc = crc32(&code_hash) as i64;
            let args_crc = crc32(&args) as i64;

            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM scripts
                     WHERE code_hash_crc = ?1 AND args_crc = ?2
                       AND code_hash = ?3 AND hash_type = ?4 AND args = ?5",
                    params![code_hash_crc, args_crc, code_hash, hash_type, args],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(id) = existing {
                return Ok(id);
            }

            conn.execute(
                "INSERT INTO scripts (code_hash, code_hash_crc, hash_type, args, args_crc)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![code_hash, code_hash_crc, hash_type, args, args_crc],
            )?;
            let id = conn.last_insert_rowid();
            debug!("Created script {} for code hash {}", id, code_hash);
            Ok(id)
        })
        .await
    }
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    async fn latest_checkpoint(
        &self,
        kind: CheckpointKind,
    ) -> Result<Option<Checkpoint>, StoreError> {
        self.with_conn(move |conn| Ok(latest_checkpoint(conn, kind)?))
            .await
    }

    async fn apply_block(&self, batch: BlockMutations) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            apply_block_tx(&tx, &batch)?;
            tx.commit()?;
            debug!(
                "Committed {} mutations for {} block {}",
                batch.mutations.len(),
                batch.checkpoint.kind.name(),
                batch.checkpoint.block_number
            );
            Ok(())
        })
        .await
    }

    async fn rollback_block(
        &self,
        kind: CheckpointKind,
        block_number: u64,
    ) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let replayed = rollback_block_tx(&tx, kind, block_number)?;
            tx.commit()?;
            info!(
                "Rolled back {} block {} ({} version rows replayed)",
                kind.name(),
                block_number,
                replayed
            );
            Ok(())
        })
        .await
    }

    async fn prune_checkpoints(
        &self,
        kind: CheckpointKind,
        keep_count: usize,
    ) -> Result<usize, StoreError> {
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM check_infos WHERE check_type = ?1 AND block_number NOT IN (
                    SELECT block_number FROM check_infos
                    WHERE check_type = ?1 ORDER BY block_number DESC LIMIT ?2
                )",
                params![kind.as_i64(), keep_count as i64],
            )?;
            Ok(removed)
        })
        .await
    }
}
