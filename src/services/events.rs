//! Event system for trace operations
//!
//! Recall results are not persisted here. Audit trails and alerting hang off
//! this bus instead.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::models::Direction;

/// Events emitted by the tracing service
#[derive(Debug, Clone)]
pub enum TraceEvent {
    TraceCompleted {
        org_id: String,
        root_lp_id: String,
        direction: Direction,
        node_count: usize,
    },
    RecallSimulated {
        simulation_id: Uuid,
        org_id: String,
        root_count: usize,
        total_affected_lps: usize,
        total_quantity: Decimal,
    },
    CycleDetected {
        org_id: String,
        lp_id: String,
        from_lp_id: String,
        direction: Direction,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &TraceEvent);
}

/// Event bus for broadcasting trace events
pub struct EventBus {
    sender: broadcast::Sender<TraceEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: TraceEvent) {
        trace!(event = ?event, "Emitting trace event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TraceEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs every event
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &TraceEvent) {
        match event {
            TraceEvent::TraceCompleted { org_id, root_lp_id, direction, node_count } => {
                debug!(org_id = %org_id, root = %root_lp_id, direction = %direction, nodes = node_count, "Trace completed");
            }
            TraceEvent::RecallSimulated { simulation_id, org_id, total_affected_lps, total_quantity, .. } => {
                info!(
                    simulation_id = %simulation_id,
                    org_id = %org_id,
                    affected = total_affected_lps,
                    quantity = %total_quantity,
                    "Recall simulated"
                );
            }
            TraceEvent::CycleDetected { org_id, lp_id, from_lp_id, direction } => {
                // The engine already warned at detection time
                debug!(org_id = %org_id, lp_id = %lp_id, from_lp_id = %from_lp_id, direction = %direction, "Data integrity: genealogy cycle");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
