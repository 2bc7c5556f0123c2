//! Service layer for usability-store
//!
//! Services encapsulate business logic between HTTP handlers and repositories.
//! Each service wraps database operations with:
//! - Input validation
//! - Transaction boundaries
//! - Event emission for audit
//!
//! ## Architecture
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (business logic)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod response;
pub mod events;
pub mod access_service;
pub mod design_service;
pub mod standard_service;
pub mod heuristic_service;

// Re-exports
pub use response::*;
pub use events::{AuditLogListener, EventBus, EventListener, ResponseKind, SurveyEvent};
pub use access_service::{AccessService, Redemption};
pub use design_service::{DesignService, ResponsePath};
pub use standard_service::StandardResponseService;
pub use heuristic_service::HeuristicResponseService;

use crate::catalog::{self, CatalogDefinition, SeedReport};
use crate::config::Config;
use crate::db::SurveyDb;
use crate::error::StorageError;
use std::sync::Arc;

/// Service container for dependency injection
///
/// Holds all services with a shared database. Pass this to HttpServer for
/// handler access.
pub struct Services {
    pub db: Arc<SurveyDb>,
    pub design: Arc<DesignService>,
    pub access: Arc<AccessService>,
    pub standard: Arc<StandardResponseService>,
    pub heuristic: Arc<HeuristicResponseService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services with shared database
    pub fn new(db: Arc<SurveyDb>, config: &Config) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            design: Arc::new(DesignService::new(db.clone(), config.code_length)),
            access: Arc::new(AccessService::new(db.clone(), events.clone())),
            standard: Arc::new(StandardResponseService::new(db.clone(), events.clone())),
            heuristic: Arc::new(HeuristicResponseService::new(db.clone(), events.clone())),
            events,
            db,
        }
    }

    /// Write a heuristic catalog into the store
    pub fn seed_catalog(&self, definition: &CatalogDefinition) -> Result<SeedReport, StorageError> {
        let report = catalog::seed_catalog(&self.db, definition)?;
        self.events.emit(SurveyEvent::CatalogSeeded {
            heuristics: report.heuristics,
            subprinciples: report.subprinciples,
        });
        Ok(report)
    }
}
