//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::StorageError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else if current_version > SCHEMA_VERSION {
        return Err(StorageError::Config(format!(
            "Database schema v{} is newer than this binary (v{})",
            current_version, SCHEMA_VERSION
        )));
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    Ok(version.unwrap_or(0))
}

/// Set schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StorageError> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(CATALOG_SCHEMA)
        .map_err(|e| StorageError::Internal(format!("Failed to create catalog tables: {}", e)))?;

    conn.execute_batch(DESIGN_SCHEMA)
        .map_err(|e| StorageError::Internal(format!("Failed to create design tables: {}", e)))?;

    conn.execute_batch(RESPONSES_SCHEMA)
        .map_err(|e| StorageError::Internal(format!("Failed to create response tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| StorageError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), StorageError> {
    info!(from_version, "No migration steps registered");
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Users and the heuristic catalog
const CATALOG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL,
    email TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('Administrador', 'Propietario', 'Evaluador')),
    experience TEXT CHECK (experience IS NULL OR experience IN ('Novato', 'Experto')),
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Loaded by the seed step; codes never change
CREATE TABLE IF NOT EXISTS heuristics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    description TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subprinciples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL UNIQUE,
    subtitle TEXT NOT NULL,
    description TEXT NOT NULL,
    example TEXT NOT NULL,
    heuristic_id INTEGER NOT NULL,
    FOREIGN KEY (heuristic_id) REFERENCES heuristics(id) ON DELETE CASCADE
);
"#;

/// Design tests and their questions
const DESIGN_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS design_tests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER,
    owner_name TEXT,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT 'N/A',
    test_type TEXT NOT NULL CHECK (test_type IN ('Movil', 'Web', 'Tablet')),
    has_heuristics INTEGER NOT NULL DEFAULT 0,
    code TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    FOREIGN KEY (owner_id) REFERENCES users(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS design_questions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    test_id INTEGER NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    url_frame TEXT NOT NULL DEFAULT '',
    -- Only set when the owning test has no heuristics
    response_type TEXT CHECK (response_type IS NULL OR response_type IN ('Calificacion', 'Legibilidad', 'Coherencia')),
    FOREIGN KEY (test_id) REFERENCES design_tests(id) ON DELETE CASCADE
);

-- Only populated when the owning test has heuristics
CREATE TABLE IF NOT EXISTS question_heuristics (
    question_id INTEGER NOT NULL,
    heuristic_id INTEGER NOT NULL,
    PRIMARY KEY (question_id, heuristic_id),
    FOREIGN KEY (question_id) REFERENCES design_questions(id) ON DELETE CASCADE,
    FOREIGN KEY (heuristic_id) REFERENCES heuristics(id) ON DELETE CASCADE
);
"#;

/// Access gate and the two response shapes
const RESPONSES_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS evaluator_access (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    evaluator_id INTEGER NOT NULL,
    test_id INTEGER NOT NULL,
    locked INTEGER NOT NULL DEFAULT 1,
    hidden INTEGER NOT NULL DEFAULT 0,
    accessed_at TEXT NOT NULL,
    UNIQUE (evaluator_id, test_id),
    FOREIGN KEY (evaluator_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (test_id) REFERENCES design_tests(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS standard_responses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    evaluator_id INTEGER NOT NULL,
    test_id INTEGER NOT NULL,
    question_id INTEGER NOT NULL,
    response_type TEXT NOT NULL,
    response_value INTEGER NOT NULL,
    comment TEXT NOT NULL DEFAULT '',
    complete INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    UNIQUE (evaluator_id, test_id, question_id),
    FOREIGN KEY (evaluator_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (test_id) REFERENCES design_tests(id) ON DELETE CASCADE,
    FOREIGN KEY (question_id) REFERENCES design_questions(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS heuristic_responses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    evaluator_id INTEGER NOT NULL,
    test_id INTEGER NOT NULL,
    question_id INTEGER NOT NULL,
    subprinciple_id INTEGER NOT NULL,
    score INTEGER NOT NULL,
    complete INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    UNIQUE (evaluator_id, test_id, question_id, subprinciple_id),
    FOREIGN KEY (evaluator_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (test_id) REFERENCES design_tests(id) ON DELETE CASCADE,
    FOREIGN KEY (question_id) REFERENCES design_questions(id) ON DELETE CASCADE,
    FOREIGN KEY (subprinciple_id) REFERENCES subprinciples(id) ON DELETE CASCADE
);

-- One comment per evaluated heuristic, not per subprinciple score
CREATE TABLE IF NOT EXISTS heuristic_comments (
    evaluator_id INTEGER NOT NULL,
    test_id INTEGER NOT NULL,
    question_id INTEGER NOT NULL,
    heuristic_id INTEGER NOT NULL,
    comment TEXT NOT NULL DEFAULT '',
    updated_at TEXT NOT NULL,
    PRIMARY KEY (evaluator_id, test_id, question_id, heuristic_id),
    FOREIGN KEY (evaluator_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (test_id) REFERENCES design_tests(id) ON DELETE CASCADE,
    FOREIGN KEY (question_id) REFERENCES design_questions(id) ON DELETE CASCADE,
    FOREIGN KEY (heuristic_id) REFERENCES heuristics(id) ON DELETE CASCADE
);
"#;

/// Index definitions for fast queries
const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_subprinciples_heuristic ON subprinciples(heuristic_id);
CREATE INDEX IF NOT EXISTS idx_questions_test ON design_questions(test_id);
CREATE INDEX IF NOT EXISTS idx_access_evaluator ON evaluator_access(evaluator_id, hidden);
CREATE INDEX IF NOT EXISTS idx_access_test_locked ON evaluator_access(test_id, locked);
CREATE INDEX IF NOT EXISTS idx_standard_test_evaluator ON standard_responses(test_id, evaluator_id);
CREATE INDEX IF NOT EXISTS idx_heuristic_test_evaluator ON heuristic_responses(test_id, evaluator_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        set_schema_version(&conn, SCHEMA_VERSION + 1).unwrap();
        assert!(matches!(init_schema(&conn), Err(StorageError::Config(_))));
    }
}
