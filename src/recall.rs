//! Recall simulator
//!
//! Resolves one LP or a whole batch, traces every root forward and backward,
//! and sums the affected stock. Each affected LP is counted once no matter
//! how many roots or paths reach it.
//!
//! A recall report that silently misses stock is worse than no report, so any
//! lookup failure, timeout or budget overrun fails the whole simulation.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, info_span};
use uuid::Uuid;

use crate::error::TraceError;
use crate::models::{
    flatten_nodes, Direction, LicensePlate, RecallRequest, RecallSimulation, RecallSummary,
    StatusBreakdown, TraceNode,
};
use crate::source::GenealogySource;
use crate::trace::{TraceEngine, TraceOptions, TraversalState};

pub struct RecallSimulator<'a> {
    source: &'a dyn GenealogySource,
    engine: TraceEngine<'a>,
}

impl<'a> RecallSimulator<'a> {
    pub fn new(source: &'a dyn GenealogySource) -> Self {
        Self {
            source,
            engine: TraceEngine::new(source),
        }
    }

    /// Simulate a recall.
    ///
    /// `request.max_depth`, when present, overrides `limits.max_depth`; node
    /// budget and deadline come from `limits` and cover the whole call.
    pub fn simulate(
        &self,
        org_id: &str,
        request: &RecallRequest,
        limits: &TraceOptions,
    ) -> Result<RecallSimulation, TraceError> {
        let options = TraceOptions {
            max_depth: request.max_depth.unwrap_or(limits.max_depth),
            ..limits.clone()
        };
        options.validate()?;

        let simulation_id = Uuid::new_v4();
        let span = info_span!("recall", org_id = %org_id, simulation_id = %simulation_id);
        let _enter = span.enter();

        let roots = self.resolve_roots(org_id, request)?;
        debug!(roots = roots.len(), max_depth = options.max_depth, "Recall roots resolved");

        // One multi-source pass per direction: an LP reachable from several
        // roots is claimed at its shallowest depth over all of them
        let mut forward_state = TraversalState::new(options.max_nodes);
        let forward = self.engine.expand_roots(org_id, &roots, Direction::Forward, &options, &mut forward_state)?;

        // Both directions draw from one node budget
        let mut backward_state =
            TraversalState::new(options.max_nodes.saturating_sub(forward_state.nodes_visited()));
        let backward = self.engine.expand_roots(org_id, &roots, Direction::Backward, &options, &mut backward_state)?;

        let summary = summarize(
            &roots,
            &forward.trace_tree,
            &backward.trace_tree,
            forward_state.nodes_visited(),
            backward_state.nodes_visited(),
            forward.has_more_levels || backward.has_more_levels,
        );

        let mut warnings = forward.warnings;
        warnings.extend(backward.warnings);

        info!(
            roots = summary.root_count,
            affected = summary.total_affected_lps,
            quantity = %summary.total_quantity,
            warnings = warnings.len(),
            "Recall simulation complete"
        );

        let root_lp = roots[0].clone();
        Ok(RecallSimulation {
            simulation_id,
            org_id: org_id.to_string(),
            root_lp,
            roots,
            forward_trace: forward.trace_tree,
            backward_trace: backward.trace_tree,
            summary,
            warnings,
            created_at: Utc::now(),
        })
    }

    /// Root set for a request, ordered by `created_at` then id.
    ///
    /// `lp_id` takes precedence over `batch_number`. Empty strings count as
    /// absent. A request with neither identifier is malformed and fails with
    /// `InvalidArgument`; identifiers that match no LP in the org fail with
    /// `NotFound`.
    pub fn resolve_roots(&self, org_id: &str, request: &RecallRequest) -> Result<Vec<LicensePlate>, TraceError> {
        let lp_id = request.lp_id.as_deref().filter(|s| !s.trim().is_empty());
        let batch_number = request.batch_number.as_deref().filter(|s| !s.trim().is_empty());

        let mut roots = match (lp_id, batch_number) {
            (Some(lp_id), batch) => {
                if let Some(batch) = batch {
                    debug!(lp_id = %lp_id, batch_number = %batch, "Both identifiers given; using lp_id");
                }
                match self.engine.resolve_root(org_id, lp_id) {
                    Ok(root) => vec![root],
                    Err(TraceError::NotFound(_)) => Vec::new(),
                    Err(e) => return Err(e),
                }
            }
            (None, Some(batch)) => self
                .source
                .get_lps_by_batch(org_id, batch)?
                .into_iter()
                .filter(|lp| lp.org_id == org_id)
                .collect(),
            (None, None) => {
                return Err(TraceError::InvalidArgument(
                    "either lp_id or batch_number is required".into(),
                ))
            }
        };

        if roots.is_empty() {
            return Err(TraceError::NotFound("Root LP not found".into()));
        }

        roots.sort_by(|a, b| a.trace_order_key().cmp(&b.trace_order_key()));
        roots.dedup_by(|a, b| a.id == b.id);
        Ok(roots)
    }
}

/// Deduplicated impact over roots ∪ forward ∪ backward
fn summarize(
    roots: &[LicensePlate],
    forward_trace: &[TraceNode],
    backward_trace: &[TraceNode],
    forward_count: usize,
    backward_count: usize,
    has_more_levels: bool,
) -> RecallSummary {
    let mut affected: HashMap<&str, &LicensePlate> = HashMap::new();
    for lp in roots {
        affected.entry(lp.id.as_str()).or_insert(lp);
    }
    for node in flatten_nodes(forward_trace).into_iter().chain(flatten_nodes(backward_trace)) {
        affected.entry(node.lp.id.as_str()).or_insert(&node.lp);
    }

    let mut total_quantity = Decimal::ZERO;
    let mut status_breakdown = StatusBreakdown::default();
    for lp in affected.values() {
        total_quantity += lp.quantity;
        status_breakdown.record(lp.status);
    }

    RecallSummary {
        total_affected_lps: affected.len(),
        total_quantity,
        root_count: roots.len(),
        forward_count,
        backward_count,
        has_more_levels,
        status_breakdown,
    }
}
