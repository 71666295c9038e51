//! SQLite adapter for license plates and genealogy links
//!
//! The warehouse and production subsystems own these rows. This adapter
//! serves the tenant-scoped, batched reads the trace engine needs, and can
//! load fixture data for local runs and tests.
//!
//! ## Tables
//!
//! - `license_plates` - LP snapshots (quantity stored as exact decimal text)
//! - `genealogy_links` - input→output edges per production event

pub mod schema;
pub mod license_plates;
pub mod links;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::TraceError;
use crate::models::{GenealogyLink, LicensePlate};
use crate::source::GenealogySource;

use links::LinkEnd;

/// SQLite database for genealogy reads
pub struct GenealogyDb {
    conn: Mutex<Connection>,
}

impl GenealogyDb {
    /// Open or create the genealogy database
    pub fn open(storage_dir: &Path) -> Result<Self, TraceError> {
        let db_path = storage_dir.join("genealogy.db");
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(&db_path)
            .map_err(|e| TraceError::DataAccess(format!("Failed to open SQLite: {}", e)))?;

        // WAL lets traces read while the seed import writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| TraceError::DataAccess(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, TraceError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(|e| TraceError::DataAccess(format!("Failed to open in-memory SQLite: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<(), TraceError> {
        self.with_conn(|conn| schema::init_schema(conn))
    }

    /// Run a closure against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, TraceError>
    where
        F: FnOnce(&Connection) -> Result<T, TraceError>,
    {
        let conn = self.conn.lock()
            .map_err(|e| TraceError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, TraceError>
    where
        F: FnOnce(&mut Connection) -> Result<T, TraceError>,
    {
        let mut conn = self.conn.lock()
            .map_err(|e| TraceError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Load LPs and links in one transaction
    pub fn bulk_insert(&self, data: &SeedData) -> Result<SeedResult, TraceError> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()
                .map_err(|e| TraceError::DataAccess(format!("Failed to start transaction: {}", e)))?;

            for lp in &data.license_plates {
                license_plates::upsert_lp(&tx, lp)?;
            }

            let mut links_inserted = 0;
            for link in &data.genealogy_links {
                if links::insert_link(&tx, link)? {
                    links_inserted += 1;
                }
            }

            tx.commit()
                .map_err(|e| TraceError::DataAccess(format!("Failed to commit transaction: {}", e)))?;

            Ok(SeedResult {
                license_plates: data.license_plates.len(),
                genealogy_links: links_inserted,
            })
        })
    }

    /// Row counts
    pub fn stats(&self) -> Result<DbStats, TraceError> {
        self.with_conn(|conn| {
            let lp_count: i64 = conn
                .query_row("SELECT COUNT(*) FROM license_plates", [], |row| row.get(0))
                .map_err(|e| TraceError::DataAccess(format!("Query failed: {}", e)))?;

            let link_count: i64 = conn
                .query_row("SELECT COUNT(*) FROM genealogy_links", [], |row| row.get(0))
                .map_err(|e| TraceError::DataAccess(format!("Query failed: {}", e)))?;

            let org_count: i64 = conn
                .query_row("SELECT COUNT(DISTINCT org_id) FROM license_plates", [], |row| row.get(0))
                .map_err(|e| TraceError::DataAccess(format!("Query failed: {}", e)))?;

            Ok(DbStats {
                license_plate_count: lp_count as u64,
                genealogy_link_count: link_count as u64,
                org_count: org_count as u64,
            })
        })
    }
}

impl GenealogySource for GenealogyDb {
    fn get_lp(&self, org_id: &str, lp_id: &str) -> Result<Option<LicensePlate>, TraceError> {
        self.with_conn(|conn| license_plates::get_lp(conn, org_id, lp_id))
    }

    fn get_lps(&self, org_id: &str, lp_ids: &[String]) -> Result<Vec<LicensePlate>, TraceError> {
        if lp_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| license_plates::get_lps(conn, org_id, lp_ids))
    }

    fn get_lps_by_batch(&self, org_id: &str, batch_number: &str) -> Result<Vec<LicensePlate>, TraceError> {
        self.with_conn(|conn| license_plates::get_lps_by_batch(conn, org_id, batch_number))
    }

    fn get_links_by_inputs(
        &self,
        org_id: &str,
        lp_ids: &[String],
        include_reversed: bool,
    ) -> Result<Vec<GenealogyLink>, TraceError> {
        if lp_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| links::get_links_by_end(conn, org_id, LinkEnd::Input, lp_ids, include_reversed))
    }

    fn get_links_by_outputs(
        &self,
        org_id: &str,
        lp_ids: &[String],
        include_reversed: bool,
    ) -> Result<Vec<GenealogyLink>, TraceError> {
        if lp_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| links::get_links_by_end(conn, org_id, LinkEnd::Output, lp_ids, include_reversed))
    }

    fn get_links_by_event(&self, org_id: &str, production_event_id: &str) -> Result<Vec<GenealogyLink>, TraceError> {
        self.with_conn(|conn| links::get_links_by_event(conn, org_id, production_event_id))
    }
}

/// Fixture/seed file contents
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub license_plates: Vec<LicensePlate>,
    #[serde(default)]
    pub genealogy_links: Vec<GenealogyLink>,
}

impl SeedData {
    /// Read a JSON seed file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TraceError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Result of a seed import
#[derive(Debug, Clone, serde::Serialize)]
pub struct SeedResult {
    pub license_plates: usize,
    pub genealogy_links: usize,
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub license_plate_count: u64,
    pub genealogy_link_count: u64,
    pub org_count: u64,
}
