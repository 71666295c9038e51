//! Genealogy link lookups
//!
//! Frontier lookups join both link endpoints against `license_plates` of the
//! requesting org, so a link pointing outside the tenant is never returned.
//! Reversed links stay in the table for audit and are returned only when a
//! caller asks for them.

use rusqlite::types::{ToSql, Type};
use rusqlite::{params, params_from_iter, Connection, Row};

use crate::error::TraceError;
use crate::models::{GenealogyLink, OperationType};

use super::license_plates::MAX_IDS_PER_QUERY;

/// Which end of the link the frontier ids are matched against
#[derive(Debug, Clone, Copy)]
pub enum LinkEnd {
    Input,
    Output,
}

impl LinkEnd {
    fn column(&self) -> &'static str {
        match self {
            LinkEnd::Input => "l.input_lp_id",
            LinkEnd::Output => "l.output_lp_id",
        }
    }
}

fn row_to_link(row: &Row<'_>) -> rusqlite::Result<GenealogyLink> {
    let operation_type: String = row.get(5)?;
    let operation_type = operation_type.parse::<OperationType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into())
    })?;

    Ok(GenealogyLink {
        id: row.get(0)?,
        org_id: row.get(1)?,
        production_event_id: row.get(2)?,
        input_lp_id: row.get(3)?,
        output_lp_id: row.get(4)?,
        operation_type,
        is_reversed: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Links whose `end` matches any of `lp_ids`, scoped to one org
pub fn get_links_by_end(
    conn: &Connection,
    org_id: &str,
    end: LinkEnd,
    lp_ids: &[String],
    include_reversed: bool,
) -> Result<Vec<GenealogyLink>, TraceError> {
    let mut results = Vec::new();

    for chunk in lp_ids.chunks(MAX_IDS_PER_QUERY) {
        let placeholders = vec!["?"; chunk.len()].join(",");
        let sql = format!(
            "SELECT l.id, l.org_id, l.production_event_id, l.input_lp_id, l.output_lp_id,
                    l.operation_type, l.is_reversed, l.created_at
             FROM genealogy_links l
             JOIN license_plates i ON i.id = l.input_lp_id AND i.org_id = l.org_id
             JOIN license_plates o ON o.id = l.output_lp_id AND o.org_id = l.org_id
             WHERE l.org_id = ? AND (? OR l.is_reversed = 0) AND {} IN ({})
             ORDER BY l.created_at, l.id",
            end.column(),
            placeholders
        );

        let mut stmt = conn.prepare(&sql)
            .map_err(|e| TraceError::DataAccess(format!("Failed to prepare statement: {}", e)))?;

        let mut bound: Vec<&dyn ToSql> = vec![&org_id as &dyn ToSql, &include_reversed];
        bound.extend(chunk.iter().map(|id| id as &dyn ToSql));
        let rows = stmt.query_map(params_from_iter(bound), row_to_link)
            .map_err(|e| TraceError::DataAccess(format!("Failed to query genealogy links: {}", e)))?;

        for row in rows {
            results.push(row.map_err(|e| TraceError::DataAccess(format!("Failed to read row: {}", e)))?);
        }
    }

    Ok(results)
}

/// Active links recorded by one production event
pub fn get_links_by_event(
    conn: &Connection,
    org_id: &str,
    production_event_id: &str,
) -> Result<Vec<GenealogyLink>, TraceError> {
    let mut stmt = conn.prepare(
        "SELECT l.id, l.org_id, l.production_event_id, l.input_lp_id, l.output_lp_id,
                l.operation_type, l.is_reversed, l.created_at
         FROM genealogy_links l
         JOIN license_plates i ON i.id = l.input_lp_id AND i.org_id = l.org_id
         JOIN license_plates o ON o.id = l.output_lp_id AND o.org_id = l.org_id
         WHERE l.org_id = ?1 AND l.production_event_id = ?2 AND l.is_reversed = 0
         ORDER BY l.created_at, l.id",
    ).map_err(|e| TraceError::DataAccess(format!("Failed to prepare statement: {}", e)))?;

    let rows = stmt.query_map(params![org_id, production_event_id], row_to_link)
        .map_err(|e| TraceError::DataAccess(format!("Failed to query genealogy links: {}", e)))?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| TraceError::DataAccess(format!("Failed to read row: {}", e)))
}

/// Insert a link; re-recording the same edge of the same event is a no-op
pub fn insert_link(conn: &Connection, link: &GenealogyLink) -> Result<bool, TraceError> {
    let rows = conn.execute(
        "INSERT INTO genealogy_links (id, org_id, production_event_id, input_lp_id, output_lp_id,
                                      operation_type, is_reversed, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT DO NOTHING",
        params![
            link.id,
            link.org_id,
            link.production_event_id,
            link.input_lp_id,
            link.output_lp_id,
            link.operation_type.as_str(),
            link.is_reversed,
            link.created_at,
        ],
    ).map_err(|e| TraceError::DataAccess(format!("Failed to insert genealogy link: {}", e)))?;

    Ok(rows > 0)
}
