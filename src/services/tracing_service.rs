//! Tracing service - request-level orchestration of the trace engine
//!
//! Applies configured defaults, validates identifiers, sets the per-request
//! deadline and emits events. The engine calls themselves are synchronous;
//! async callers should run them on a blocking thread.

use std::sync::Arc;
use std::time::Instant;

use crate::config::TraceDefaults;
use crate::error::TraceError;
use crate::models::{Direction, EventGenealogy, RecallRequest, RecallSimulation, TraceResult, TraceWarning};
use crate::recall::RecallSimulator;
use crate::source::GenealogySource;
use crate::trace::{TraceEngine, TraceOptions};

use super::events::{EventBus, TraceEvent};

pub struct TracingService {
    source: Arc<dyn GenealogySource>,
    defaults: TraceDefaults,
    events: Arc<EventBus>,
}

impl TracingService {
    pub fn new(source: Arc<dyn GenealogySource>, defaults: TraceDefaults, events: Arc<EventBus>) -> Self {
        Self { source, defaults, events }
    }

    pub fn defaults(&self) -> &TraceDefaults {
        &self.defaults
    }

    /// What was made from `lp_id`
    pub fn trace_forward(&self, org_id: &str, lp_id: &str, max_depth: Option<u32>) -> Result<TraceResult, TraceError> {
        self.trace(org_id, lp_id, Direction::Forward, max_depth, false)
    }

    /// What `lp_id` was made from
    pub fn trace_backward(&self, org_id: &str, lp_id: &str, max_depth: Option<u32>) -> Result<TraceResult, TraceError> {
        self.trace(org_id, lp_id, Direction::Backward, max_depth, false)
    }

    /// Single-root trace. `include_reversed` also follows corrected links.
    pub fn trace(
        &self,
        org_id: &str,
        lp_id: &str,
        direction: Direction,
        max_depth: Option<u32>,
        include_reversed: bool,
    ) -> Result<TraceResult, TraceError> {
        require("org_id", org_id)?;
        require("lp_id", lp_id)?;

        let options = self
            .options(max_depth.unwrap_or(self.defaults.default_max_depth))
            .include_reversed(include_reversed);
        let engine = TraceEngine::new(self.source.as_ref());
        let result = engine.trace(org_id, lp_id, direction, &options)?;

        self.emit_warnings(org_id, &result.warnings);
        self.events.emit(TraceEvent::TraceCompleted {
            org_id: org_id.to_string(),
            root_lp_id: result.root_lp.id.clone(),
            direction,
            node_count: result.summary.count(),
        });

        Ok(result)
    }

    /// Impact of recalling one LP or a whole batch
    pub fn simulate_recall(&self, org_id: &str, request: &RecallRequest) -> Result<RecallSimulation, TraceError> {
        require("org_id", org_id)?;

        let limits = self.options(self.defaults.recall_max_depth);
        let simulator = RecallSimulator::new(self.source.as_ref());
        let simulation = simulator.simulate(org_id, request, &limits)?;

        self.emit_warnings(org_id, &simulation.warnings);
        self.events.emit(TraceEvent::RecallSimulated {
            simulation_id: simulation.simulation_id,
            org_id: org_id.to_string(),
            root_count: simulation.summary.root_count,
            total_affected_lps: simulation.summary.total_affected_lps,
            total_quantity: simulation.summary.total_quantity,
        });

        Ok(simulation)
    }

    /// Links recorded by one production event, grouped by operation type
    pub fn genealogy_by_event(&self, org_id: &str, production_event_id: &str) -> Result<EventGenealogy, TraceError> {
        require("org_id", org_id)?;
        require("production_event_id", production_event_id)?;

        let links = self.source.get_links_by_event(org_id, production_event_id)?;
        Ok(EventGenealogy::group(production_event_id, links))
    }

    fn options(&self, max_depth: u32) -> TraceOptions {
        let options = TraceOptions::with_max_depth(max_depth).max_nodes(self.defaults.max_nodes);
        match self.defaults.request_timeout {
            Some(timeout) => options.deadline(Instant::now() + timeout),
            None => options,
        }
    }

    fn emit_warnings(&self, org_id: &str, warnings: &[TraceWarning]) {
        for warning in warnings {
            self.events.emit(TraceEvent::CycleDetected {
                org_id: org_id.to_string(),
                lp_id: warning.lp_id.clone(),
                from_lp_id: warning.from_lp_id.clone(),
                direction: warning.direction,
            });
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), TraceError> {
    if value.trim().is_empty() {
        return Err(TraceError::InvalidArgument(format!("{} is required", field)));
    }
    Ok(())
}
