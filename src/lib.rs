//! LP Genealogy - lot traceability for license plates
//!
//! Answers "what was made from this LP?", "what was this LP made from?" and
//! "what is affected if this LP or batch is recalled?" over the
//! input→output links recorded by production events.
//!
//! ## Architecture
//!
//! ```text
//! HTTP (hyper)  →  TracingService  →  TraceEngine / RecallSimulator
//!                                           ↓
//!                                   GenealogySource
//!                              (SQLite adapter or in-memory)
//! ```
//!
//! Traversal is breadth-first, one batched link lookup and one batched LP
//! lookup per depth level. Every lookup is scoped to a single organization.
//! Cycles in the link data end expansion at the repeated LP and are reported
//! as warnings rather than errors.
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/lp-genealogy/
//! ├── genealogy.db       # SQLite (license_plates, genealogy_links)
//! └── config.toml        # Configuration
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod recall;
pub mod services;
pub mod source;
pub mod trace;

// Re-exports
pub use config::{Config, TraceDefaults};
pub use db::{GenealogyDb, SeedData};
pub use error::TraceError;
pub use http::HttpServer;
pub use models::{
    Direction, EventGenealogy, GenealogyLink, LicensePlate, LpStatus, OperationType, RecallRequest,
    RecallSimulation, RecallSummary, TraceNode, TraceResult, TraceSummary, TraceWarning,
};
pub use recall::RecallSimulator;
pub use services::{EventBus, Services, TraceEvent, TracingService};
pub use source::{GenealogySource, MemorySource};
pub use trace::{TraceEngine, TraceOptions};
