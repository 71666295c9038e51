//! Trace limits: depth bound, node budget and deadline

use std::time::{Duration, Instant};

use crate::error::TraceError;

/// Depth used by forward/backward traces when the caller gives none
pub const DEFAULT_MAX_DEPTH: u32 = 20;

/// Depth used by recall simulations when the caller gives none
pub const DEFAULT_RECALL_MAX_DEPTH: u32 = 10;

pub const MIN_MAX_DEPTH: u32 = 1;
pub const MAX_MAX_DEPTH: u32 = 100;

/// Visited-node ceiling for one call
pub const DEFAULT_MAX_NODES: usize = 10_000;

/// Reject depths outside [1, 100]
pub fn validate_max_depth(max_depth: u32) -> Result<u32, TraceError> {
    if !(MIN_MAX_DEPTH..=MAX_MAX_DEPTH).contains(&max_depth) {
        return Err(TraceError::InvalidArgument(format!(
            "max_depth must be between {} and {}, got {}",
            MIN_MAX_DEPTH, MAX_MAX_DEPTH, max_depth
        )));
    }
    Ok(max_depth)
}

/// Limits applied to one trace or recall call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceOptions {
    pub max_depth: u32,
    pub max_nodes: usize,
    pub deadline: Option<Instant>,
    /// Follow links marked reversed (corrections). Off by default.
    pub include_reversed: bool,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_nodes: DEFAULT_MAX_NODES,
            deadline: None,
            include_reversed: false,
        }
    }
}

impl TraceOptions {
    pub fn with_max_depth(max_depth: u32) -> Self {
        Self {
            max_depth,
            ..Default::default()
        }
    }

    /// Limits for a recall simulation with the recall default depth
    pub fn for_recall() -> Self {
        Self::with_max_depth(DEFAULT_RECALL_MAX_DEPTH)
    }

    pub fn max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    pub fn include_reversed(mut self, include_reversed: bool) -> Self {
        self.include_reversed = include_reversed;
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline relative to now
    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    /// Validate depth and budget before any lookup happens
    pub fn validate(&self) -> Result<(), TraceError> {
        validate_max_depth(self.max_depth)?;
        if self.max_nodes == 0 {
            return Err(TraceError::InvalidArgument("max_nodes must be at least 1".into()));
        }
        Ok(())
    }

    /// Fail with `Timeout` once the deadline has passed
    pub fn check_deadline(&self) -> Result<(), TraceError> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(TraceError::Timeout(
                "trace aborted before completion".into(),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_bounds() {
        assert!(validate_max_depth(0).is_err());
        assert!(validate_max_depth(101).is_err());
        assert_eq!(validate_max_depth(1).unwrap(), 1);
        assert_eq!(validate_max_depth(100).unwrap(), 100);
    }

    #[test]
    fn test_zero_node_budget_rejected() {
        let err = TraceOptions::default().max_nodes(0).validate().unwrap_err();
        assert!(matches!(err, TraceError::InvalidArgument(_)));
    }

    #[test]
    fn test_expired_deadline() {
        let past = Instant::now() - Duration::from_millis(5);
        let options = TraceOptions::default().deadline(past);
        assert!(matches!(options.check_deadline(), Err(TraceError::Timeout(_))));
        assert!(TraceOptions::default().check_deadline().is_ok());
    }
}
