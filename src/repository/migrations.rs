//! Schema creation for the harvest store.
//!
//! The schema is small and additive, so it is applied as idempotent
//! `CREATE ... IF NOT EXISTS` statements on every `init`/`run`.

use diesel_async::SimpleAsyncConnection;
use tracing::debug;

use super::pool::{AsyncSqlitePool, DieselError};

/// Tables mirrored by `crate::schema`.
pub const SCHEMA_SQL: &str = r#"
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;

    CREATE TABLE IF NOT EXISTS targets (
        id TEXT PRIMARY KEY NOT NULL,
        display_name TEXT NOT NULL,
        base_address TEXT,
        region TEXT
    );

    CREATE TABLE IF NOT EXISTS records (
        id TEXT PRIMARY KEY NOT NULL,
        owner_id TEXT NOT NULL,
        process_number TEXT NOT NULL,
        organization TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT '',
        closing_date TEXT,
        summary_text TEXT NOT NULL DEFAULT '',
        modality TEXT NOT NULL DEFAULT '',
        description TEXT,
        disclosure_window TEXT,
        dispute_mode TEXT,
        estimated_value REAL,
        flags TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_records_owner ON records(owner_id);
    CREATE INDEX IF NOT EXISTS idx_records_created ON records(created_at);

    CREATE TABLE IF NOT EXISTS record_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
        record_id TEXT NOT NULL REFERENCES records(id),
        line_number INTEGER NOT NULL,
        code TEXT NOT NULL DEFAULT '',
        description TEXT NOT NULL DEFAULT '',
        unit TEXT NOT NULL DEFAULT '',
        quantity REAL NOT NULL DEFAULT 0,
        unit_value REAL NOT NULL DEFAULT 0,
        total_value REAL NOT NULL DEFAULT 0,
        lot_id TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_record_items_record ON record_items(record_id);
"#;

/// Create any missing tables and indexes.
pub async fn init_schema(pool: &AsyncSqlitePool) -> Result<(), DieselError> {
    let mut conn = pool.get().await?;
    conn.batch_execute(SCHEMA_SQL).await?;
    debug!("Schema ready at {}", pool.database_url());
    Ok(())
}
