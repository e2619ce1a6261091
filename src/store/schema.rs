use super::records::{Family, FamilySpec};
use rusqlite::Connection;

const BASE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS check_infos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        check_type INTEGER NOT NULL,
        block_number INTEGER NOT NULL,
        block_hash TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (check_type, block_number)
    );

    CREATE TABLE IF NOT EXISTS scripts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        code_hash TEXT NOT NULL,
        code_hash_crc INTEGER NOT NULL,
        hash_type INTEGER NOT NULL,
        args TEXT NOT NULL,
        args_crc INTEGER NOT NULL,
        UNIQUE (code_hash, hash_type, args)
    );
    CREATE INDEX IF NOT EXISTS idx_scripts_crc ON scripts (code_hash_crc, args_crc);
";

fn family_schema(spec: &FamilySpec) -> String {
    let columns: Vec<String> = spec
        .columns
        .iter()
        .map(|column| format!("{} {}", column.name, column.sql_type))
        .collect();

    // version rows keep every column twice, nullable on both sides
    let mut version_columns = vec![
        "old_block_number INTEGER".to_string(),
        "new_block_number INTEGER".to_string(),
    ];
    for column in &spec.columns[1..] {
        let sql_type = column.sql_type.trim_end_matches(" NOT NULL");
        version_columns.push(format!("old_{} {}", column.name, sql_type));
        version_columns.push(format!("new_{} {}", column.name, sql_type));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            {columns}
        );
        CREATE UNIQUE INDEX IF NOT EXISTS uq_{table}_key ON {table} ({key});
        CREATE INDEX IF NOT EXISTS idx_{table}_block ON {table} (block_number);
        CREATE TABLE IF NOT EXISTS {versions} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            block_number INTEGER NOT NULL,
            tx_index INTEGER NOT NULL,
            action_type INTEGER NOT NULL,
            {version_columns}
        );
        CREATE INDEX IF NOT EXISTS idx_{versions}_block ON {versions} (block_number);",
        table = spec.table,
        columns = columns.join(",\n            "),
        key = spec.key.join(", "),
        versions = spec.versions_table(),
        version_columns = version_columns.join(",\n            "),
    )
}

/// Create all tables; safe to run on an existing database.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(BASE_SCHEMA)?;
    for family in Family::ALL {
        conn.execute_batch(&family_schema(family.spec()))?;
    }
    Ok(())
}
