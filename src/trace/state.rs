//! Per-call traversal state
//!
//! A `TraversalState` is created by each trace or recall call and passed
//! explicitly to every expansion it runs. Nothing here outlives the call.

use std::collections::HashSet;

use crate::error::TraceError;

/// Visited LP ids plus the node budget they count against
#[derive(Debug)]
pub struct TraversalState {
    visited: HashSet<String>,
    nodes_visited: usize,
    max_nodes: usize,
}

impl TraversalState {
    pub fn new(max_nodes: usize) -> Self {
        Self {
            visited: HashSet::new(),
            nodes_visited: 0,
            max_nodes,
        }
    }

    /// Mark a traversal origin. Origins are never emitted as nodes and do
    /// not count against the budget.
    pub fn mark_origin(&mut self, lp_id: &str) {
        self.visited.insert(lp_id.to_string());
    }

    /// Claim an LP for the current traversal.
    ///
    /// Returns `Ok(false)` if it was already visited. Fails with
    /// `ResourceExceeded` once more than `max_nodes` LPs have been claimed.
    pub fn visit(&mut self, lp_id: &str) -> Result<bool, TraceError> {
        if self.visited.contains(lp_id) {
            return Ok(false);
        }
        self.visited.insert(lp_id.to_string());
        self.nodes_visited += 1;
        if self.nodes_visited > self.max_nodes {
            return Err(TraceError::ResourceExceeded { limit: self.max_nodes });
        }
        Ok(true)
    }

    pub fn contains(&self, lp_id: &str) -> bool {
        self.visited.contains(lp_id)
    }

    /// Nodes claimed so far, origins excluded
    pub fn nodes_visited(&self) -> usize {
        self.nodes_visited
    }
}
