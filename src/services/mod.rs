//! Service layer for lp-genealogy
//!
//! Services sit between HTTP handlers and the genealogy source. They apply
//! configured limits, validate request identifiers and emit events.
//!
//! ## Architecture
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! TracingService (defaults, deadline, events)
//!     ↓
//! TraceEngine / RecallSimulator
//!     ↓
//! GenealogySource (db/*.rs or in-memory)
//! ```

pub mod response;
pub mod events;
pub mod tracing_service;

// Re-exports
pub use response::*;
pub use events::{spawn_logging_listener, EventBus, EventListener, TraceEvent};
pub use tracing_service::TracingService;

use std::sync::Arc;

use crate::config::TraceDefaults;
use crate::db::GenealogyDb;
use crate::source::GenealogySource;

/// Service container handed to the HTTP server
pub struct Services {
    pub tracing: Arc<TracingService>,
    pub events: Arc<EventBus>,
    /// Present when backed by SQLite; used for health stats
    pub db: Option<Arc<GenealogyDb>>,
}

impl Services {
    /// Create services over the SQLite adapter
    pub fn new(db: Arc<GenealogyDb>, defaults: TraceDefaults) -> Self {
        let mut services = Self::with_source(db.clone(), defaults);
        services.db = Some(db);
        services
    }

    /// Create services over any genealogy source
    pub fn with_source(source: Arc<dyn GenealogySource>, defaults: TraceDefaults) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            tracing: Arc::new(TracingService::new(source, defaults, events.clone())),
            events,
            db: None,
        }
    }
}
