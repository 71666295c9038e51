//! Domain types shared by the adapters, the trace engine and the API layer.
//!
//! License plates and genealogy links are read-only snapshots: this crate
//! never mutates them. Trace and recall results are plain serializable values
//! built fresh for every call.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Inventory entities
// =============================================================================

/// Lifecycle status of a license plate as recorded by the warehouse subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LpStatus {
    Available,
    Reserved,
    InProduction,
    Consumed,
    Blocked,
    Shipped,
    Quarantine,
    #[serde(other)]
    Unknown,
}

impl LpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LpStatus::Available => "available",
            LpStatus::Reserved => "reserved",
            LpStatus::InProduction => "in_production",
            LpStatus::Consumed => "consumed",
            LpStatus::Blocked => "blocked",
            LpStatus::Shipped => "shipped",
            LpStatus::Quarantine => "quarantine",
            LpStatus::Unknown => "unknown",
        }
    }

    /// Decode a stored status. Values written by newer subsystems map to `Unknown`.
    pub fn parse(value: &str) -> Self {
        match value {
            "available" => LpStatus::Available,
            "reserved" => LpStatus::Reserved,
            "in_production" => LpStatus::InProduction,
            "consumed" => LpStatus::Consumed,
            "blocked" => LpStatus::Blocked,
            "shipped" => LpStatus::Shipped,
            "quarantine" => LpStatus::Quarantine,
            _ => LpStatus::Unknown,
        }
    }
}

impl fmt::Display for LpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A uniquely identified unit of tracked inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicensePlate {
    pub id: String,
    pub org_id: String,
    #[serde(default)]
    pub lp_number: Option<String>,
    pub product_id: String,
    #[serde(default)]
    pub batch_number: Option<String>,
    pub quantity: Decimal,
    pub uom: String,
    pub status: LpStatus,
    pub created_at: DateTime<Utc>,
}

impl LicensePlate {
    /// Deterministic sibling ordering: creation time, then id
    pub fn trace_order_key(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, self.id.as_str())
    }
}

/// Kind of production operation that recorded a genealogy link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Consume,
    Output,
    Split,
    Merge,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Consume => "consume",
            OperationType::Output => "output",
            OperationType::Split => "split",
            OperationType::Merge => "merge",
        }
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consume" => Ok(OperationType::Consume),
            "output" => Ok(OperationType::Output),
            "split" => Ok(OperationType::Split),
            "merge" => Ok(OperationType::Merge),
            other => Err(format!("unknown operation_type '{}'", other)),
        }
    }
}

fn default_operation_type() -> OperationType {
    OperationType::Consume
}

/// "input_lp_id was consumed to produce output_lp_id" in one production event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenealogyLink {
    pub id: String,
    pub org_id: String,
    pub production_event_id: String,
    pub input_lp_id: String,
    pub output_lp_id: String,
    #[serde(default = "default_operation_type")]
    pub operation_type: OperationType,
    /// Correction records. A reversed link is never traversed.
    #[serde(default)]
    pub is_reversed: bool,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Trace results
// =============================================================================

/// Direction of a genealogy trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Descendants: follow links from input to output
    Forward,
    /// Ancestors: follow links from output to input
    Backward,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }

    /// The LP on the near side of a link when expanding in this direction
    pub fn near_end<'a>(&self, link: &'a GenealogyLink) -> &'a str {
        match self {
            Direction::Forward => &link.input_lp_id,
            Direction::Backward => &link.output_lp_id,
        }
    }

    /// The LP on the far side of a link when expanding in this direction
    pub fn far_end<'a>(&self, link: &'a GenealogyLink) -> &'a str {
        match self {
            Direction::Forward => &link.output_lp_id,
            Direction::Backward => &link.input_lp_id,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One LP reached by a trace, with its subtree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceNode {
    pub lp: LicensePlate,
    pub depth: u32,
    /// Link through which this LP was first reached
    pub link_id: String,
    pub operation_type: OperationType,
    pub children: Vec<TraceNode>,
}

impl TraceNode {
    /// Visit this node and all descendants in pre-order
    pub fn walk<'a>(&'a self, out: &mut Vec<&'a TraceNode>) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            for child in node.children.iter().rev() {
                stack.push(child);
            }
        }
    }
}

/// Flatten a forest of trace nodes in pre-order
pub fn flatten_nodes(tree: &[TraceNode]) -> Vec<&TraceNode> {
    let mut out = Vec::new();
    for node in tree {
        node.walk(&mut out);
    }
    out
}

/// Kind of data-integrity problem found while tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    Cycle,
}

/// Non-fatal data-integrity finding. The trace stops expanding at the
/// offending link and carries on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceWarning {
    pub kind: WarningKind,
    pub direction: Direction,
    /// LP reached a second time
    pub lp_id: String,
    /// LP whose expansion reached it
    pub from_lp_id: String,
    pub link_id: String,
}

/// Trace counters. The count serializes as `total_descendants` for forward
/// traces and `total_ancestors` for backward traces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_descendants: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_ancestors: Option<usize>,
    pub max_depth: u32,
    pub has_more_levels: bool,
    pub integrity_warnings: usize,
}

impl TraceSummary {
    pub fn new(direction: Direction, count: usize, max_depth: u32, has_more_levels: bool, integrity_warnings: usize) -> Self {
        let (total_descendants, total_ancestors) = match direction {
            Direction::Forward => (Some(count), None),
            Direction::Backward => (None, Some(count)),
        };
        Self {
            total_descendants,
            total_ancestors,
            max_depth,
            has_more_levels,
            integrity_warnings,
        }
    }

    /// Distinct LPs visited, excluding the root
    pub fn count(&self) -> usize {
        self.total_descendants.or(self.total_ancestors).unwrap_or(0)
    }
}

/// Result of a single-root forward or backward trace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceResult {
    pub root_lp: LicensePlate,
    pub direction: Direction,
    pub trace_tree: Vec<TraceNode>,
    pub summary: TraceSummary,
    pub warnings: Vec<TraceWarning>,
}

/// Every active link a production event recorded, grouped by operation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventGenealogy {
    pub production_event_id: String,
    pub consume: Vec<GenealogyLink>,
    pub output: Vec<GenealogyLink>,
    pub split: Vec<GenealogyLink>,
    pub merge: Vec<GenealogyLink>,
}

impl EventGenealogy {
    /// Group links in the order given
    pub fn group(production_event_id: impl Into<String>, links: Vec<GenealogyLink>) -> Self {
        let mut grouped = Self {
            production_event_id: production_event_id.into(),
            ..Default::default()
        };
        for link in links {
            match link.operation_type {
                OperationType::Consume => grouped.consume.push(link),
                OperationType::Output => grouped.output.push(link),
                OperationType::Split => grouped.split.push(link),
                OperationType::Merge => grouped.merge.push(link),
            }
        }
        grouped
    }

    pub fn len(&self) -> usize {
        self.consume.len() + self.output.len() + self.split.len() + self.merge.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Recall simulation
// =============================================================================

/// Recall request as accepted by the API layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecallRequest {
    #[serde(default)]
    pub lp_id: Option<String>,
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default)]
    pub max_depth: Option<u32>,
}

impl RecallRequest {
    pub fn for_lp(lp_id: impl Into<String>) -> Self {
        Self {
            lp_id: Some(lp_id.into()),
            ..Default::default()
        }
    }

    pub fn for_batch(batch_number: impl Into<String>) -> Self {
        Self {
            batch_number: Some(batch_number.into()),
            ..Default::default()
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = Some(max_depth);
        self
    }
}

/// Number of affected distinct LPs per status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusBreakdown {
    pub available: usize,
    pub reserved: usize,
    pub in_production: usize,
    pub consumed: usize,
    pub blocked: usize,
    pub shipped: usize,
    pub quarantine: usize,
    pub unknown: usize,
}

impl StatusBreakdown {
    pub fn record(&mut self, status: LpStatus) {
        let slot = match status {
            LpStatus::Available => &mut self.available,
            LpStatus::Reserved => &mut self.reserved,
            LpStatus::InProduction => &mut self.in_production,
            LpStatus::Consumed => &mut self.consumed,
            LpStatus::Blocked => &mut self.blocked,
            LpStatus::Shipped => &mut self.shipped,
            LpStatus::Quarantine => &mut self.quarantine,
            LpStatus::Unknown => &mut self.unknown,
        };
        *slot += 1;
    }

    pub fn total(&self) -> usize {
        self.available
            + self.reserved
            + self.in_production
            + self.consumed
            + self.blocked
            + self.shipped
            + self.quarantine
            + self.unknown
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecallSummary {
    pub total_affected_lps: usize,
    pub total_quantity: Decimal,
    pub root_count: usize,
    pub forward_count: usize,
    pub backward_count: usize,
    /// Some trace stopped at `max_depth`; deeper stock may be affected
    pub has_more_levels: bool,
    pub status_breakdown: StatusBreakdown,
}

/// Impact of recalling one LP or one batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecallSimulation {
    pub simulation_id: Uuid,
    pub org_id: String,
    /// Primary root, or the earliest root when a batch resolved to several
    pub root_lp: LicensePlate,
    pub roots: Vec<LicensePlate>,
    pub forward_trace: Vec<TraceNode>,
    pub backward_trace: Vec<TraceNode>,
    pub summary: RecallSummary,
    pub warnings: Vec<TraceWarning>,
    pub created_at: DateTime<Utc>,
}
