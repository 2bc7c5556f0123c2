//! Usability Store - evaluation backend for usability studies
//!
//! Stores design tests, the heuristic catalog and evaluator responses, and
//! runs the evaluator access and response lifecycle over HTTP.
//!
//! ## Lifecycle
//!
//! ```text
//! redeem code ──► access unlocked ──► save drafts (any number, last write wins)
//!                       ▲                    │
//!                       │                    ▼
//!                 redeem again ◄──── finalize: drafts complete + access locked
//! ```
//!
//! Each design test takes one of two response shapes, fixed at creation by
//! `has_heuristics`: standard answers (one value per question) or heuristic
//! answers (one score per subprinciple, one comment per heuristic).
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/usability-store/
//! ├── survey.db              # SQLite database (WAL mode)
//! └── config.toml            # Configuration
//! ```

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod services;
pub mod views;

// Re-exports
pub use catalog::{seed_catalog, CatalogDefinition, SeedReport};
pub use config::Config;
pub use db::SurveyDb;
pub use error::StorageError;
pub use http::HttpServer;
pub use services::{EventBus, Services, SurveyEvent};
