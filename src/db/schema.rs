//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::TraceError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), TraceError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, TraceError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    ).map_err(|e| TraceError::DataAccess(format!("Failed to create schema_version table: {}", e)))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), TraceError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| TraceError::DataAccess(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| TraceError::DataAccess(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), TraceError> {
    conn.execute_batch(LICENSE_PLATES_SCHEMA)
        .map_err(|e| TraceError::DataAccess(format!("Failed to create license_plates table: {}", e)))?;

    conn.execute_batch(GENEALOGY_SCHEMA)
        .map_err(|e| TraceError::DataAccess(format!("Failed to create genealogy tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| TraceError::DataAccess(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// License plate snapshot table. Quantity is TEXT to keep exact decimals.
const LICENSE_PLATES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS license_plates (
    id TEXT PRIMARY KEY,
    org_id TEXT NOT NULL,
    lp_number TEXT,
    product_id TEXT NOT NULL,
    batch_number TEXT,
    quantity TEXT NOT NULL,
    uom TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'available',
    created_at TEXT NOT NULL
);
"#;

/// One row per input→output edge of a production event
const GENEALOGY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS genealogy_links (
    id TEXT PRIMARY KEY,
    org_id TEXT NOT NULL,
    production_event_id TEXT NOT NULL,
    input_lp_id TEXT NOT NULL,
    output_lp_id TEXT NOT NULL,
    operation_type TEXT NOT NULL DEFAULT 'consume',
    is_reversed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(org_id, production_event_id, input_lp_id, output_lp_id)
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_lp_org_batch ON license_plates(org_id, batch_number);
CREATE INDEX IF NOT EXISTS idx_links_org_input ON genealogy_links(org_id, input_lp_id);
CREATE INDEX IF NOT EXISTS idx_links_org_output ON genealogy_links(org_id, output_lp_id);
CREATE INDEX IF NOT EXISTS idx_links_event ON genealogy_links(org_id, production_event_id);
"#;
