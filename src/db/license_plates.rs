//! License plate lookups
//!
//! Read paths used by the trace engine, plus an upsert used for fixtures and
//! seed imports.

use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;

use crate::error::TraceError;
use crate::models::{LicensePlate, LpStatus};

/// SQLite bound-parameter budget per batched lookup
pub const MAX_IDS_PER_QUERY: usize = 500;

const LP_COLUMNS: &str =
    "id, org_id, lp_number, product_id, batch_number, quantity, uom, status, created_at";

fn row_to_lp(row: &Row<'_>) -> rusqlite::Result<LicensePlate> {
    let quantity: String = row.get(5)?;
    let quantity = Decimal::from_str(&quantity)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    let status: String = row.get(7)?;

    Ok(LicensePlate {
        id: row.get(0)?,
        org_id: row.get(1)?,
        lp_number: row.get(2)?,
        product_id: row.get(3)?,
        batch_number: row.get(4)?,
        quantity,
        uom: row.get(6)?,
        status: LpStatus::parse(&status),
        created_at: row.get(8)?,
    })
}

/// Get an LP by id within an org
pub fn get_lp(conn: &Connection, org_id: &str, lp_id: &str) -> Result<Option<LicensePlate>, TraceError> {
    let sql = format!("SELECT {} FROM license_plates WHERE org_id = ? AND id = ?", LP_COLUMNS);

    conn.query_row(&sql, params![org_id, lp_id], row_to_lp)
        .optional()
        .map_err(|e| TraceError::DataAccess(format!("Failed to get license plate: {}", e)))
}

/// Get many LPs within an org in as few queries as the parameter limit allows
pub fn get_lps(conn: &Connection, org_id: &str, lp_ids: &[String]) -> Result<Vec<LicensePlate>, TraceError> {
    let mut results = Vec::with_capacity(lp_ids.len());

    for chunk in lp_ids.chunks(MAX_IDS_PER_QUERY) {
        let placeholders = vec!["?"; chunk.len()].join(",");
        let sql = format!(
            "SELECT {} FROM license_plates WHERE org_id = ? AND id IN ({})",
            LP_COLUMNS, placeholders
        );

        let mut stmt = conn.prepare(&sql)
            .map_err(|e| TraceError::DataAccess(format!("Failed to prepare statement: {}", e)))?;

        let bound = std::iter::once(org_id).chain(chunk.iter().map(String::as_str));
        let rows = stmt.query_map(params_from_iter(bound), row_to_lp)
            .map_err(|e| TraceError::DataAccess(format!("Failed to query license plates: {}", e)))?;

        for row in rows {
            results.push(row.map_err(|e| TraceError::DataAccess(format!("Failed to read row: {}", e)))?);
        }
    }

    Ok(results)
}

/// Every LP of an org carrying a batch number
pub fn get_lps_by_batch(conn: &Connection, org_id: &str, batch_number: &str) -> Result<Vec<LicensePlate>, TraceError> {
    let sql = format!(
        "SELECT {} FROM license_plates WHERE org_id = ? AND batch_number = ? ORDER BY created_at, id",
        LP_COLUMNS
    );

    let mut stmt = conn.prepare(&sql)
        .map_err(|e| TraceError::DataAccess(format!("Failed to prepare statement: {}", e)))?;

    let rows = stmt.query_map(params![org_id, batch_number], row_to_lp)
        .map_err(|e| TraceError::DataAccess(format!("Failed to query batch: {}", e)))?;

    let mut results = Vec::new();
    for row in rows {
        results.push(row.map_err(|e| TraceError::DataAccess(format!("Failed to read row: {}", e)))?);
    }

    Ok(results)
}

/// Insert or replace an LP snapshot
pub fn upsert_lp(conn: &Connection, lp: &LicensePlate) -> Result<(), TraceError> {
    conn.execute(
        "INSERT INTO license_plates (id, org_id, lp_number, product_id, batch_number, quantity, uom, status, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
         org_id = excluded.org_id,
         lp_number = excluded.lp_number,
         product_id = excluded.product_id,
         batch_number = excluded.batch_number,
         quantity = excluded.quantity,
         uom = excluded.uom,
         status = excluded.status,
         created_at = excluded.created_at",
        params![
            lp.id,
            lp.org_id,
            lp.lp_number,
            lp.product_id,
            lp.batch_number,
            lp.quantity.to_string(),
            lp.uom,
            lp.status.as_str(),
            lp.created_at,
        ],
    ).map_err(|e| TraceError::DataAccess(format!("Failed to upsert license plate: {}", e)))?;

    Ok(())
}
