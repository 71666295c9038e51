//! Trace engine - bounded, layer-by-layer genealogy traversal
//!
//! Given a root license plate, a forward trace finds everything made from it
//! and a backward trace finds everything it was made from. Both directions
//! run the same breadth-first expansion; only the link lookup differs.
//!
//! ## Guarantees
//!
//! - One batched link lookup and one batched LP lookup per frontier layer
//! - An LP appears at most once per call, at its shallowest depth
//! - Siblings ordered by `created_at`, then LP id
//! - Cycles in the stored genealogy stop expansion and produce a warning,
//!   never a failure
//! - Exceeding the node budget or the deadline fails the whole call; a
//!   partial tree is never returned

pub mod options;
pub mod state;
pub mod tree;

pub use options::{
    validate_max_depth, TraceOptions, DEFAULT_MAX_DEPTH, DEFAULT_MAX_NODES,
    DEFAULT_RECALL_MAX_DEPTH, MAX_MAX_DEPTH, MIN_MAX_DEPTH,
};
pub use state::TraversalState;

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, info_span, warn};

use crate::error::TraceError;
use crate::models::{
    Direction, GenealogyLink, LicensePlate, TraceNode, TraceResult, TraceSummary, TraceWarning,
    WarningKind,
};
use crate::source::GenealogySource;

use tree::NodeTable;

/// Outcome of expanding one root in one direction
#[derive(Debug)]
pub struct Expansion {
    pub trace_tree: Vec<TraceNode>,
    pub node_count: usize,
    pub max_depth: u32,
    pub has_more_levels: bool,
    pub warnings: Vec<TraceWarning>,
}

/// Genealogy traversal over a data access adapter
pub struct TraceEngine<'a> {
    source: &'a dyn GenealogySource,
}

impl<'a> TraceEngine<'a> {
    pub fn new(source: &'a dyn GenealogySource) -> Self {
        Self { source }
    }

    /// Descendants of `lp_id`
    pub fn trace_forward(&self, org_id: &str, lp_id: &str, options: &TraceOptions) -> Result<TraceResult, TraceError> {
        self.trace(org_id, lp_id, Direction::Forward, options)
    }

    /// Ancestors of `lp_id`
    pub fn trace_backward(&self, org_id: &str, lp_id: &str, options: &TraceOptions) -> Result<TraceResult, TraceError> {
        self.trace(org_id, lp_id, Direction::Backward, options)
    }

    /// Single-root trace in either direction
    pub fn trace(
        &self,
        org_id: &str,
        lp_id: &str,
        direction: Direction,
        options: &TraceOptions,
    ) -> Result<TraceResult, TraceError> {
        options.validate()?;

        let root = self.resolve_root(org_id, lp_id)?;
        let mut state = TraversalState::new(options.max_nodes);
        let expansion = self.expand(org_id, &root, direction, options, &mut state)?;

        Ok(TraceResult {
            summary: TraceSummary::new(
                direction,
                expansion.node_count,
                expansion.max_depth,
                expansion.has_more_levels,
                expansion.warnings.len(),
            ),
            root_lp: root,
            direction,
            trace_tree: expansion.trace_tree,
            warnings: expansion.warnings,
        })
    }

    /// Look up a root LP within the org. Foreign ids are indistinguishable from missing ones.
    pub fn resolve_root(&self, org_id: &str, lp_id: &str) -> Result<LicensePlate, TraceError> {
        match self.source.get_lp(org_id, lp_id)? {
            Some(lp) if lp.org_id == org_id => Ok(lp),
            _ => Err(TraceError::NotFound(format!("License plate {} not found", lp_id))),
        }
    }

    /// Breadth-first expansion of one root
    pub fn expand(
        &self,
        org_id: &str,
        root: &LicensePlate,
        direction: Direction,
        options: &TraceOptions,
        state: &mut TraversalState,
    ) -> Result<Expansion, TraceError> {
        self.expand_roots(org_id, std::slice::from_ref(root), direction, options, state)
    }

    /// Breadth-first expansion of several roots at once.
    ///
    /// Every root sits in the first frontier at depth 0, so an LP reachable
    /// from more than one root is claimed at its shallowest depth over all of
    /// them and expanded from there. Top-level nodes come out grouped by root
    /// in the order of `roots`.
    pub fn expand_roots(
        &self,
        org_id: &str,
        roots: &[LicensePlate],
        direction: Direction,
        options: &TraceOptions,
        state: &mut TraversalState,
    ) -> Result<Expansion, TraceError> {
        let first = roots.first().map(|root| root.id.as_str()).unwrap_or_default();
        let span = info_span!("expand", org_id = %org_id, root = %first, roots = roots.len(), direction = %direction);
        let _enter = span.enter();

        for root in roots {
            state.mark_origin(&root.id);
        }

        let mut table = NodeTable::new();
        let mut warnings = Vec::new();
        let mut has_more_levels = false;

        // (lp id, slot in table or None for a root, index of the owning root)
        let mut frontier: Vec<(String, Option<usize>, usize)> = roots
            .iter()
            .enumerate()
            .map(|(i, root)| (root.id.clone(), None, i))
            .collect();
        let mut depth: u32 = 0;

        while !frontier.is_empty() && depth < options.max_depth {
            options.check_deadline()?;

            let frontier_ids: Vec<String> = frontier.iter().map(|(id, _, _)| id.clone()).collect();
            let links = self
                .source
                .get_links(org_id, direction, &frontier_ids, options.include_reversed)?;
            let by_near = group_links(org_id, direction, &frontier_ids, &links, options.include_reversed);

            let unseen: Vec<String> = by_near
                .values()
                .flatten()
                .map(|link| direction.far_end(link))
                .filter(|id| !state.contains(id))
                .collect::<HashSet<&str>>()
                .into_iter()
                .map(str::to_string)
                .collect();

            let snapshots: HashMap<String, LicensePlate> = self
                .source
                .get_lps(org_id, &unseen)?
                .into_iter()
                .filter(|lp| lp.org_id == org_id)
                .map(|lp| (lp.id.clone(), lp))
                .collect();

            options.check_deadline()?;

            debug!(
                depth,
                frontier = frontier.len(),
                links = links.len(),
                candidates = snapshots.len(),
                "Expanding layer"
            );

            let child_depth = depth + 1;
            let mut next = Vec::new();

            for (near_id, parent_slot, root_idx) in &frontier {
                let Some(near_links) = by_near.get(near_id.as_str()) else {
                    continue;
                };

                let mut fresh: Vec<(&LicensePlate, &GenealogyLink)> = Vec::new();
                for link in near_links {
                    let far_id = direction.far_end(link);
                    if state.contains(far_id) {
                        if table.closes_cycle(&roots[*root_idx].id, *parent_slot, far_id) {
                            warn!(
                                org_id = %org_id,
                                lp_id = %far_id,
                                from_lp_id = %near_id,
                                link_id = %link.id,
                                direction = %direction,
                                "Genealogy cycle detected; not expanding"
                            );
                            warnings.push(TraceWarning {
                                kind: WarningKind::Cycle,
                                direction,
                                lp_id: far_id.to_string(),
                                from_lp_id: near_id.clone(),
                                link_id: link.id.clone(),
                            });
                        }
                        continue;
                    }
                    match snapshots.get(far_id) {
                        Some(lp) => fresh.push((lp, *link)),
                        None => debug!(lp_id = %far_id, link_id = %link.id, "Link endpoint outside org; skipped"),
                    }
                }

                fresh.sort_by(|(a, la), (b, lb)| {
                    a.trace_order_key()
                        .cmp(&b.trace_order_key())
                        .then_with(|| la.id.cmp(&lb.id))
                });

                for (lp, link) in fresh {
                    // Another link of this layer may already have claimed it
                    if !state.visit(&lp.id)? {
                        continue;
                    }
                    let slot = table.insert(lp.clone(), child_depth, *parent_slot, link);
                    if child_depth < options.max_depth {
                        next.push((lp.id.clone(), Some(slot), *root_idx));
                    } else {
                        has_more_levels = true;
                    }
                }
            }

            frontier = next;
            depth = child_depth;
        }

        let node_count = table.len();
        let max_depth = table.deepest();

        info!(
            nodes = node_count,
            max_depth,
            warnings = warnings.len(),
            "Trace expansion complete"
        );

        Ok(Expansion {
            trace_tree: table.into_tree(),
            node_count,
            max_depth,
            has_more_levels,
            warnings,
        })
    }
}

/// Group usable links by their near endpoint.
///
/// Drops links from another org, reversed links unless asked for, and links
/// whose near end is not in the frontier, in case an adapter returns more
/// than it was asked for.
fn group_links<'l>(
    org_id: &str,
    direction: Direction,
    frontier_ids: &[String],
    links: &'l [GenealogyLink],
    include_reversed: bool,
) -> HashMap<&'l str, Vec<&'l GenealogyLink>> {
    let wanted: HashSet<&str> = frontier_ids.iter().map(String::as_str).collect();
    let mut by_near: HashMap<&str, Vec<&GenealogyLink>> = HashMap::new();

    for link in links {
        if link.org_id != org_id || (link.is_reversed && !include_reversed) {
            continue;
        }
        let near = direction.near_end(link);
        if !wanted.contains(near) {
            continue;
        }
        by_near.entry(near).or_default().push(link);
    }

    by_near
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{flatten_nodes, LpStatus, OperationType};
    use crate::source::MemorySource;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ORG: &str = "org-123";

    fn lp_at(id: &str, org: &str, minute: i64) -> LicensePlate {
        LicensePlate {
            id: id.into(),
            org_id: org.into(),
            lp_number: Some(id.to_uppercase()),
            product_id: "prod-1".into(),
            batch_number: None,
            quantity: Decimal::new(100, 0),
            uom: "kg".into(),
            status: LpStatus::Available,
            created_at: Utc.with_ymd_and_hms(2025, 12, 20, 10, 0, 0).unwrap() + Duration::minutes(minute),
        }
    }

    fn lp(id: &str) -> LicensePlate {
        lp_at(id, ORG, 0)
    }

    fn link(id: &str, input: &str, output: &str) -> GenealogyLink {
        GenealogyLink {
            id: id.into(),
            org_id: ORG.into(),
            production_event_id: "wo-001".into(),
            input_lp_id: input.into(),
            output_lp_id: output.into(),
            operation_type: OperationType::Consume,
            is_reversed: false,
            created_at: Utc.with_ymd_and_hms(2025, 12, 20, 11, 0, 0).unwrap(),
        }
    }

    fn ids(tree: &[TraceNode]) -> Vec<&str> {
        tree.iter().map(|n| n.lp.id.as_str()).collect()
    }

    /// Counts link lookups to check frontier batching
    struct CountingSource {
        inner: MemorySource,
        link_calls: AtomicUsize,
    }

    impl GenealogySource for CountingSource {
        fn get_lp(&self, org_id: &str, lp_id: &str) -> Result<Option<LicensePlate>, TraceError> {
            self.inner.get_lp(org_id, lp_id)
        }
        fn get_lps(&self, org_id: &str, lp_ids: &[String]) -> Result<Vec<LicensePlate>, TraceError> {
            self.inner.get_lps(org_id, lp_ids)
        }
        fn get_lps_by_batch(&self, org_id: &str, batch: &str) -> Result<Vec<LicensePlate>, TraceError> {
            self.inner.get_lps_by_batch(org_id, batch)
        }
        fn get_links_by_inputs(&self, org_id: &str, lp_ids: &[String], reversed: bool) -> Result<Vec<GenealogyLink>, TraceError> {
            self.link_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get_links_by_inputs(org_id, lp_ids, reversed)
        }
        fn get_links_by_outputs(&self, org_id: &str, lp_ids: &[String], reversed: bool) -> Result<Vec<GenealogyLink>, TraceError> {
            self.link_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get_links_by_outputs(org_id, lp_ids, reversed)
        }
        fn get_links_by_event(&self, org_id: &str, event_id: &str) -> Result<Vec<GenealogyLink>, TraceError> {
            self.inner.get_links_by_event(org_id, event_id)
        }
    }

    #[test]
    fn test_single_link_forward_and_backward() {
        let source = MemorySource::with_data(vec![lp("lp-a"), lp("lp-b")], vec![link("gen-1", "lp-a", "lp-b")]);
        let engine = TraceEngine::new(&source);
        let options = TraceOptions::with_max_depth(10);

        let forward = engine.trace_forward(ORG, "lp-a", &options).unwrap();
        assert_eq!(ids(&forward.trace_tree), vec!["lp-b"]);
        assert_eq!(forward.trace_tree[0].depth, 1);
        assert!(forward.trace_tree[0].children.is_empty());
        assert_eq!(forward.summary.total_descendants, Some(1));
        assert_eq!(forward.summary.max_depth, 1);

        let backward = engine.trace_backward(ORG, "lp-b", &options).unwrap();
        assert_eq!(ids(&backward.trace_tree), vec!["lp-a"]);
        assert_eq!(backward.summary.total_ancestors, Some(1));
        assert_eq!(backward.summary.max_depth, 1);
    }

    #[test]
    fn test_isolated_lp_is_empty_success() {
        let source = MemorySource::with_data(vec![lp("lp-a")], vec![]);
        let engine = TraceEngine::new(&source);
        let result = engine.trace_forward(ORG, "lp-a", &TraceOptions::default()).unwrap();
        assert!(result.trace_tree.is_empty());
        assert_eq!(result.summary.count(), 0);
        assert_eq!(result.summary.max_depth, 0);
        assert!(!result.summary.has_more_levels);
    }

    #[test]
    fn test_children_ordered_by_created_at_then_id() {
        let source = MemorySource::with_data(
            vec![lp("root"), lp_at("lp-late", ORG, 5), lp_at("lp-z", ORG, 1), lp_at("lp-y", ORG, 1)],
            vec![
                link("g1", "root", "lp-late"),
                link("g2", "root", "lp-z"),
                link("g3", "root", "lp-y"),
            ],
        );
        let engine = TraceEngine::new(&source);
        let result = engine.trace_forward(ORG, "root", &TraceOptions::default()).unwrap();
        assert_eq!(ids(&result.trace_tree), vec!["lp-y", "lp-z", "lp-late"]);
    }

    #[test]
    fn test_diamond_fan_in_counted_once_without_warning() {
        // a -> b, a -> c, b -> d, c -> d
        let source = MemorySource::with_data(
            vec![lp("a"), lp("b"), lp("c"), lp("d")],
            vec![link("g1", "a", "b"), link("g2", "a", "c"), link("g3", "b", "d"), link("g4", "c", "d")],
        );
        let engine = TraceEngine::new(&source);
        let result = engine.trace_forward(ORG, "a", &TraceOptions::default()).unwrap();

        assert_eq!(result.summary.count(), 3);
        assert_eq!(result.summary.max_depth, 2);
        assert!(result.warnings.is_empty());
        // First parent in frontier order claims the shared child
        assert_eq!(ids(&result.trace_tree[0].children), vec!["d"]);
        assert!(result.trace_tree[1].children.is_empty());
    }

    #[test]
    fn test_cycle_stops_with_warning() {
        // a -> b -> c -> a
        let source = MemorySource::with_data(
            vec![lp("a"), lp("b"), lp("c")],
            vec![link("g1", "a", "b"), link("g2", "b", "c"), link("g3", "c", "a")],
        );
        let engine = TraceEngine::new(&source);
        let result = engine.trace_forward(ORG, "a", &TraceOptions::default()).unwrap();

        assert_eq!(result.summary.count(), 2);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].kind, WarningKind::Cycle);
        assert_eq!(result.warnings[0].lp_id, "a");
        assert_eq!(result.warnings[0].from_lp_id, "c");
        assert_eq!(result.summary.integrity_warnings, 1);
    }

    #[test]
    fn test_self_loop_is_cycle() {
        let source = MemorySource::with_data(vec![lp("a")], vec![link("g1", "a", "a")]);
        let engine = TraceEngine::new(&source);
        let result = engine.trace_backward(ORG, "a", &TraceOptions::default()).unwrap();
        assert!(result.trace_tree.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_depth_bound_and_more_levels() {
        let source = MemorySource::with_data(
            vec![lp("a"), lp("b"), lp("c"), lp("d")],
            vec![link("g1", "a", "b"), link("g2", "b", "c"), link("g3", "c", "d")],
        );
        let engine = TraceEngine::new(&source);

        let shallow = engine.trace_forward(ORG, "a", &TraceOptions::with_max_depth(1)).unwrap();
        assert!(flatten_nodes(&shallow.trace_tree).iter().all(|n| n.depth <= 1));
        assert_eq!(shallow.summary.count(), 1);
        assert!(shallow.summary.has_more_levels);

        let full = engine.trace_forward(ORG, "a", &TraceOptions::with_max_depth(10)).unwrap();
        assert_eq!(full.summary.max_depth, 3);
        assert!(!full.summary.has_more_levels);
    }

    #[test]
    fn test_zero_depth_rejected_before_lookup() {
        let source = MemorySource::new();
        let engine = TraceEngine::new(&source);
        let err = engine.trace_forward(ORG, "missing", &TraceOptions::with_max_depth(0)).unwrap_err();
        assert!(matches!(err, TraceError::InvalidArgument(_)));
    }

    #[test]
    fn test_cross_tenant_root_not_found() {
        let source = MemorySource::with_data(vec![lp_at("foreign", "org-other", 0)], vec![]);
        let engine = TraceEngine::new(&source);
        let err = engine.trace_backward(ORG, "foreign", &TraceOptions::default()).unwrap_err();
        assert!(matches!(err, TraceError::NotFound(_)));
    }

    #[test]
    fn test_reversed_and_foreign_links_ignored() {
        let mut reversed = link("g2", "a", "c");
        reversed.is_reversed = true;
        let mut foreign = link("g3", "a", "d");
        foreign.org_id = "org-other".into();
        let source = MemorySource::with_data(
            vec![lp("a"), lp("b"), lp("c"), lp("d")],
            vec![link("g1", "a", "b"), reversed, foreign],
        );
        let engine = TraceEngine::new(&source);
        let result = engine.trace_forward(ORG, "a", &TraceOptions::default()).unwrap();
        assert_eq!(ids(&result.trace_tree), vec!["b"]);
    }

    #[test]
    fn test_reversed_links_followed_when_requested() {
        let mut reversed = link("g2", "a", "c");
        reversed.is_reversed = true;
        let source = MemorySource::with_data(
            vec![lp("a"), lp("b"), lp_at("c", ORG, 1)],
            vec![link("g1", "a", "b"), reversed],
        );
        let engine = TraceEngine::new(&source);

        let default = engine.trace_forward(ORG, "a", &TraceOptions::default()).unwrap();
        assert_eq!(ids(&default.trace_tree), vec!["b"]);

        let options = TraceOptions::default().include_reversed(true);
        let with_reversed = engine.trace_forward(ORG, "a", &options).unwrap();
        assert_eq!(ids(&with_reversed.trace_tree), vec!["b", "c"]);
        assert_eq!(with_reversed.trace_tree[1].link_id, "g2");

        let back = engine.trace_backward(ORG, "c", &options).unwrap();
        assert_eq!(ids(&back.trace_tree), vec!["a"]);
    }

    #[test]
    fn test_multi_root_claims_shallowest_depth() {
        // r1 -> a -> n, r2 -> n -> m; n is depth 2 from r1 but depth 1 from r2
        let source = MemorySource::with_data(
            vec![lp("r1"), lp("r2"), lp("a"), lp("n"), lp("m")],
            vec![link("g1", "r1", "a"), link("g2", "a", "n"), link("g3", "r2", "n"), link("g4", "n", "m")],
        );
        let engine = TraceEngine::new(&source);
        let roots = vec![lp("r1"), lp("r2")];
        let mut state = TraversalState::new(100);

        let expansion = engine
            .expand_roots(ORG, &roots, Direction::Forward, &TraceOptions::with_max_depth(2), &mut state)
            .unwrap();

        assert_eq!(ids(&expansion.trace_tree), vec!["a", "n"]);
        let n = &expansion.trace_tree[1];
        assert_eq!(n.depth, 1);
        assert_eq!(ids(&n.children), vec!["m"]);
        assert!(expansion.trace_tree[0].children.is_empty());
        assert_eq!(expansion.node_count, 3);
        assert!(expansion.warnings.is_empty());
    }

    #[test]
    fn test_node_budget_fails_instead_of_truncating() {
        let lps: Vec<LicensePlate> = std::iter::once(lp("root"))
            .chain((0..5).map(|i| lp(&format!("c{}", i))))
            .collect();
        let links = (0..5).map(|i| link(&format!("g{}", i), "root", &format!("c{}", i))).collect();
        let source = MemorySource::with_data(lps, links);
        let engine = TraceEngine::new(&source);

        let err = engine.trace_forward(ORG, "root", &TraceOptions::default().max_nodes(4)).unwrap_err();
        assert!(matches!(err, TraceError::ResourceExceeded { limit: 4 }));

        let ok = engine.trace_forward(ORG, "root", &TraceOptions::default().max_nodes(5)).unwrap();
        assert_eq!(ok.summary.count(), 5);
    }

    #[test]
    fn test_expired_deadline_times_out() {
        let source = MemorySource::with_data(vec![lp("a"), lp("b")], vec![link("g1", "a", "b")]);
        let engine = TraceEngine::new(&source);
        let options = TraceOptions::default().deadline(std::time::Instant::now());
        let err = engine.trace_forward(ORG, "a", &options).unwrap_err();
        assert!(matches!(err, TraceError::Timeout(_)));
    }

    #[test]
    fn test_one_link_lookup_per_layer() {
        // root fans out to 3 children, each with 2 grandchildren
        let mut lps = vec![lp("root")];
        let mut links = Vec::new();
        for i in 0..3 {
            let child = format!("c{}", i);
            lps.push(lp(&child));
            links.push(link(&format!("g{}", i), "root", &child));
            for j in 0..2 {
                let grandchild = format!("c{}-{}", i, j);
                lps.push(lp(&grandchild));
                links.push(link(&format!("g{}-{}", i, j), &child, &grandchild));
            }
        }
        let source = CountingSource {
            inner: MemorySource::with_data(lps, links),
            link_calls: AtomicUsize::new(0),
        };
        let engine = TraceEngine::new(&source);
        let result = engine.trace_forward(ORG, "root", &TraceOptions::default()).unwrap();

        assert_eq!(result.summary.count(), 9);
        // layer 0, layer 1, and the empty layer 2 lookup
        assert_eq!(source.link_calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_repeated_calls_are_identical() {
        let source = MemorySource::with_data(
            vec![lp("a"), lp_at("b", ORG, 2), lp_at("c", ORG, 1), lp("d")],
            vec![link("g1", "a", "b"), link("g2", "a", "c"), link("g3", "c", "d"), link("g4", "b", "d")],
        );
        let engine = TraceEngine::new(&source);
        let first = engine.trace_forward(ORG, "a", &TraceOptions::default()).unwrap();
        let second = engine.trace_forward(ORG, "a", &TraceOptions::default()).unwrap();
        assert_eq!(first, second);
    }
}
