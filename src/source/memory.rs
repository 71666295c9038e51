//! In-memory genealogy source

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::error::TraceError;
use crate::models::{GenealogyLink, LicensePlate};

use super::GenealogySource;

/// LPs and links held in process memory.
///
/// Mirrors the SQLite adapter's tenant rules: links are returned only when
/// both endpoints exist in the requesting org.
#[derive(Default)]
pub struct MemorySource {
    lps: RwLock<HashMap<String, LicensePlate>>,
    links: RwLock<Vec<GenealogyLink>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a source from fixture rows
    pub fn with_data(lps: Vec<LicensePlate>, links: Vec<GenealogyLink>) -> Self {
        Self {
            lps: RwLock::new(lps.into_iter().map(|lp| (lp.id.clone(), lp)).collect()),
            links: RwLock::new(links),
        }
    }

    pub fn insert_lp(&self, lp: LicensePlate) -> Result<(), TraceError> {
        let mut lps = self.lps.write()
            .map_err(|e| TraceError::DataAccess(format!("Lock poisoned: {}", e)))?;
        lps.insert(lp.id.clone(), lp);
        Ok(())
    }

    pub fn insert_link(&self, link: GenealogyLink) -> Result<(), TraceError> {
        let mut links = self.links.write()
            .map_err(|e| TraceError::DataAccess(format!("Lock poisoned: {}", e)))?;
        links.push(link);
        Ok(())
    }

    fn lp_in_org(lps: &HashMap<String, LicensePlate>, org_id: &str, lp_id: &str) -> bool {
        lps.get(lp_id).map(|lp| lp.org_id == org_id).unwrap_or(false)
    }

    fn links_where<F>(&self, org_id: &str, include_reversed: bool, keep: F) -> Result<Vec<GenealogyLink>, TraceError>
    where
        F: Fn(&GenealogyLink) -> bool,
    {
        let lps = self.lps.read()
            .map_err(|e| TraceError::DataAccess(format!("Lock poisoned: {}", e)))?;
        let links = self.links.read()
            .map_err(|e| TraceError::DataAccess(format!("Lock poisoned: {}", e)))?;

        Ok(links
            .iter()
            .filter(|link| link.org_id == org_id && (include_reversed || !link.is_reversed))
            .filter(|link| keep(link))
            .filter(|link| {
                Self::lp_in_org(&lps, org_id, &link.input_lp_id)
                    && Self::lp_in_org(&lps, org_id, &link.output_lp_id)
            })
            .cloned()
            .collect())
    }
}

impl GenealogySource for MemorySource {
    fn get_lp(&self, org_id: &str, lp_id: &str) -> Result<Option<LicensePlate>, TraceError> {
        let lps = self.lps.read()
            .map_err(|e| TraceError::DataAccess(format!("Lock poisoned: {}", e)))?;
        Ok(lps.get(lp_id).filter(|lp| lp.org_id == org_id).cloned())
    }

    fn get_lps(&self, org_id: &str, lp_ids: &[String]) -> Result<Vec<LicensePlate>, TraceError> {
        let lps = self.lps.read()
            .map_err(|e| TraceError::DataAccess(format!("Lock poisoned: {}", e)))?;
        Ok(lp_ids
            .iter()
            .filter_map(|id| lps.get(id))
            .filter(|lp| lp.org_id == org_id)
            .cloned()
            .collect())
    }

    fn get_lps_by_batch(&self, org_id: &str, batch_number: &str) -> Result<Vec<LicensePlate>, TraceError> {
        let lps = self.lps.read()
            .map_err(|e| TraceError::DataAccess(format!("Lock poisoned: {}", e)))?;
        Ok(lps
            .values()
            .filter(|lp| lp.org_id == org_id && lp.batch_number.as_deref() == Some(batch_number))
            .cloned()
            .collect())
    }

    fn get_links_by_inputs(
        &self,
        org_id: &str,
        lp_ids: &[String],
        include_reversed: bool,
    ) -> Result<Vec<GenealogyLink>, TraceError> {
        let wanted: HashSet<&str> = lp_ids.iter().map(String::as_str).collect();
        self.links_where(org_id, include_reversed, |link| wanted.contains(link.input_lp_id.as_str()))
    }

    fn get_links_by_outputs(
        &self,
        org_id: &str,
        lp_ids: &[String],
        include_reversed: bool,
    ) -> Result<Vec<GenealogyLink>, TraceError> {
        let wanted: HashSet<&str> = lp_ids.iter().map(String::as_str).collect();
        self.links_where(org_id, include_reversed, |link| wanted.contains(link.output_lp_id.as_str()))
    }

    fn get_links_by_event(&self, org_id: &str, production_event_id: &str) -> Result<Vec<GenealogyLink>, TraceError> {
        let mut links = self.links_where(org_id, false, |link| link.production_event_id == production_event_id)?;
        links.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LpStatus, OperationType};
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    fn lp(id: &str, org: &str, batch: Option<&str>) -> LicensePlate {
        LicensePlate {
            id: id.into(),
            org_id: org.into(),
            lp_number: None,
            product_id: "prod-1".into(),
            batch_number: batch.map(Into::into),
            quantity: Decimal::new(100, 0),
            uom: "kg".into(),
            status: LpStatus::Available,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn link(id: &str, org: &str, input: &str, output: &str) -> GenealogyLink {
        GenealogyLink {
            id: id.into(),
            org_id: org.into(),
            production_event_id: "wo-1".into(),
            input_lp_id: input.into(),
            output_lp_id: output.into(),
            operation_type: OperationType::Consume,
            is_reversed: false,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_lookups_are_org_scoped() {
        let source = MemorySource::with_data(
            vec![lp("lp-a", "org-1", Some("B1")), lp("lp-x", "org-2", Some("B1"))],
            vec![],
        );

        assert!(source.get_lp("org-1", "lp-a").unwrap().is_some());
        assert!(source.get_lp("org-1", "lp-x").unwrap().is_none());
        assert_eq!(source.get_lps_by_batch("org-1", "B1").unwrap().len(), 1);

        let ids = vec!["lp-a".to_string(), "lp-x".to_string()];
        let found = source.get_lps("org-1", &ids).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "lp-a");
    }

    #[test]
    fn test_links_to_foreign_lp_are_hidden() {
        let source = MemorySource::with_data(
            vec![lp("lp-a", "org-1", None), lp("lp-b", "org-1", None), lp("lp-x", "org-2", None)],
            vec![link("gen-1", "org-1", "lp-a", "lp-b"), link("gen-2", "org-1", "lp-a", "lp-x")],
        );

        let links = source.get_links_by_inputs("org-1", &["lp-a".to_string()], false).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].output_lp_id, "lp-b");

        let back = source.get_links_by_outputs("org-1", &["lp-b".to_string()], false).unwrap();
        assert_eq!(back.len(), 1);
    }

    #[test]
    fn test_reversed_links_only_on_request() {
        let mut reversed = link("gen-2", "org-1", "lp-a", "lp-c");
        reversed.is_reversed = true;
        let source = MemorySource::with_data(
            vec![lp("lp-a", "org-1", None), lp("lp-b", "org-1", None), lp("lp-c", "org-1", None)],
            vec![link("gen-1", "org-1", "lp-a", "lp-b"), reversed],
        );
        let ids = vec!["lp-a".to_string()];

        assert_eq!(source.get_links_by_inputs("org-1", &ids, false).unwrap().len(), 1);
        assert_eq!(source.get_links_by_inputs("org-1", &ids, true).unwrap().len(), 2);
        // Event lookups never include corrections
        assert_eq!(source.get_links_by_event("org-1", "wo-1").unwrap().len(), 1);
        assert!(source.get_links_by_event("org-2", "wo-1").unwrap().is_empty());
    }

    #[test]
    fn test_inserts_visible_to_reads() {
        let source = MemorySource::new();
        source.insert_lp(lp("lp-a", "org-1", None)).unwrap();
        source.insert_lp(lp("lp-b", "org-1", None)).unwrap();
        source.insert_link(link("gen-1", "org-1", "lp-a", "lp-b")).unwrap();

        assert!(source.get_lp("org-1", "lp-b").unwrap().is_some());
        assert_eq!(source.get_links_by_outputs("org-1", &["lp-b".to_string()], false).unwrap().len(), 1);
    }

    #[test]
    fn test_poisoned_lock_fails_insert() {
        let source = std::sync::Arc::new(MemorySource::new());
        let poisoner = source.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.links.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        assert!(matches!(
            source.insert_link(link("gen-1", "org-1", "lp-a", "lp-b")),
            Err(TraceError::DataAccess(_))
        ));
        assert!(source.insert_lp(lp("lp-a", "org-1", None)).is_ok());
    }
}
