//! SQLite database module for evaluation data
//!
//! ## Tables
//!
//! - `users` - Owners and evaluators (identity only)
//! - `heuristics`, `subprinciples` - Fixed catalog, written only by the seed step
//! - `design_tests`, `design_questions`, `question_heuristics` - Test definitions
//! - `evaluator_access` - One gate record per (evaluator, test)
//! - `standard_responses` - Scored answers for tests without heuristics
//! - `heuristic_responses`, `heuristic_comments` - Subprinciple scores and per-heuristic comments

pub mod schema;
pub mod users;
pub mod catalog;
pub mod questions;
pub mod access;
pub mod standard_responses;
pub mod heuristic_responses;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::StorageError;

/// SQLite database for the evaluation backend
pub struct SurveyDb {
    conn: Mutex<Connection>,
}

impl SurveyDb {
    /// Open or create the database file
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening SQLite database at {:?}", path);

        let conn = Connection::open(path)
            .map_err(|e| StorageError::Internal(format!("Failed to open SQLite: {}", e)))?;

        // WAL keeps report reads from blocking response writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StorageError::Internal(format!("Failed to set PRAGMA: {}", e)))?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StorageError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Internal(format!("Failed to open in-memory SQLite: {}", e)))?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(schema::init_schema)?;

        Ok(db)
    }

    /// Run a read against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> Result<T, StorageError>,
    {
        let conn = self.conn.lock()
            .map_err(|e| StorageError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StorageError>,
    {
        let mut conn = self.conn.lock()
            .map_err(|e| StorageError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, StorageError> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<u64, StorageError> {
                let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
                Ok(n as u64)
            };

            Ok(DbStats {
                heuristic_count: count("heuristics")?,
                subprinciple_count: count("subprinciples")?,
                test_count: count("design_tests")?,
                question_count: count("design_questions")?,
                access_count: count("evaluator_access")?,
                standard_response_count: count("standard_responses")?,
                heuristic_response_count: count("heuristic_responses")?,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub heuristic_count: u64,
    pub subprinciple_count: u64,
    pub test_count: u64,
    pub question_count: u64,
    pub access_count: u64,
    pub standard_response_count: u64,
    pub heuristic_response_count: u64,
}

/// Current time as stored in timestamp columns
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// Re-exports
pub use access::AccessRow;
pub use catalog::{HeuristicRow, SubprincipleRow};
pub use design_tests::{CreateDesignTestInput, DesignTestRow};
pub use questions::{QuestionInput, QuestionRow};
pub use users::{CreateUserInput, UserRow};


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_creates_schema() {
        let db = SurveyDb::open_in_memory().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.test_count, 0);
        assert_eq!(stats.heuristic_count, 0);
    }

    #[test]
    fn test_open_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.db");
        {
            let db = SurveyDb::open(&path).unwrap();
            db.with_conn(|conn| Ok(test_support::design_test(conn, "REOPEN0001", false)))
                .unwrap();
        }
        let db = SurveyDb::open(&path).unwrap();
        assert_eq!(db.stats().unwrap().test_count, 1);
    }
}
