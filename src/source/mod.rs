//! Data access adapter contract
//!
//! The trace engine reads license plates and genealogy links only through
//! [`GenealogySource`]. Every lookup is scoped by `org_id`, and every lookup
//! over LP ids is batched so that a whole BFS frontier costs one round trip.
//!
//! ## Adapters
//!
//! - [`crate::db::GenealogyDb`] - SQLite repositories
//! - [`MemorySource`] - in-process maps for tests and embedders

pub mod memory;

pub use memory::MemorySource;

use crate::error::TraceError;
use crate::models::{Direction, GenealogyLink, LicensePlate};

/// Read-only, tenant-scoped access to license plates and genealogy links.
///
/// Implementations must return only rows belonging to `org_id`. Failures
/// should be reported as [`TraceError::DataAccess`]; "not found" is never an
/// error at this layer. Reversed links are returned only when
/// `include_reversed` is set.
pub trait GenealogySource: Send + Sync {
    /// Get a single LP
    fn get_lp(&self, org_id: &str, lp_id: &str) -> Result<Option<LicensePlate>, TraceError>;

    /// Get many LPs in one lookup. Missing and foreign ids are absent from the result.
    fn get_lps(&self, org_id: &str, lp_ids: &[String]) -> Result<Vec<LicensePlate>, TraceError>;

    /// Get every LP carrying a batch number
    fn get_lps_by_batch(&self, org_id: &str, batch_number: &str) -> Result<Vec<LicensePlate>, TraceError>;

    /// Links whose input is one of `lp_ids` (forward expansion)
    fn get_links_by_inputs(
        &self,
        org_id: &str,
        lp_ids: &[String],
        include_reversed: bool,
    ) -> Result<Vec<GenealogyLink>, TraceError>;

    /// Links whose output is one of `lp_ids` (backward expansion)
    fn get_links_by_outputs(
        &self,
        org_id: &str,
        lp_ids: &[String],
        include_reversed: bool,
    ) -> Result<Vec<GenealogyLink>, TraceError>;

    /// Active links recorded by one production event, oldest first
    fn get_links_by_event(&self, org_id: &str, production_event_id: &str) -> Result<Vec<GenealogyLink>, TraceError>;

    /// Links to expand a frontier in the given direction
    fn get_links(
        &self,
        org_id: &str,
        direction: Direction,
        lp_ids: &[String],
        include_reversed: bool,
    ) -> Result<Vec<GenealogyLink>, TraceError> {
        match direction {
            Direction::Forward => self.get_links_by_inputs(org_id, lp_ids, include_reversed),
            Direction::Backward => self.get_links_by_outputs(org_id, lp_ids, include_reversed),
        }
    }
}
