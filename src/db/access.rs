//! Evaluator access records
//!
//! One row per (evaluator, test). `locked` gates writes, `hidden` only
//! affects the evaluator's own listing.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::db::design_tests::{DesignTestRow, TestType};
use crate::db::now_timestamp;
use crate::error::StorageError;

/// Access row from database
#[derive(Debug, Clone, Serialize)]
pub struct AccessRow {
    pub id: i64,
    pub evaluator_id: i64,
    pub test_id: i64,
    pub locked: bool,
    pub hidden: bool,
    pub accessed_at: String,
}

impl AccessRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            evaluator_id: row.get("evaluator_id")?,
            test_id: row.get("test_id")?,
            locked: row.get("locked")?,
            hidden: row.get("hidden")?,
            accessed_at: row.get("accessed_at")?,
        })
    }
}

/// Visible access joined with its test and completion state
#[derive(Debug, Clone)]
pub struct AccessWithTest {
    pub access: AccessRow,
    pub test: DesignTestRow,
    /// A complete response of either kind exists for the pair
    pub is_complete: bool,
}

/// Find the access record for a pair
pub fn find_access(conn: &Connection, evaluator_id: i64, test_id: i64) -> Result<Option<AccessRow>, StorageError> {
    let row = conn
        .query_row(
            "SELECT * FROM evaluator_access WHERE evaluator_id = ? AND test_id = ?",
            params![evaluator_id, test_id],
            AccessRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Create an unlocked access record
pub fn insert_unlocked(conn: &Connection, evaluator_id: i64, test_id: i64) -> Result<AccessRow, StorageError> {
    conn.execute(
        r#"
        INSERT INTO evaluator_access (evaluator_id, test_id, locked, hidden, accessed_at)
        VALUES (?, ?, 0, 0, ?)
        "#,
        params![evaluator_id, test_id, now_timestamp()],
    )?;

    find_access(conn, evaluator_id, test_id)?
        .ok_or_else(|| StorageError::Internal("Access not found after insert".to_string()))
}

/// Unlock a locked record and refresh its timestamp
///
/// Returns false when the record was already unlocked.
pub fn unlock(conn: &Connection, access_id: i64) -> Result<bool, StorageError> {
    let changed = conn.execute(
        "UPDATE evaluator_access SET locked = 0, accessed_at = ? WHERE id = ? AND locked = 1",
        params![now_timestamp(), access_id],
    )?;
    Ok(changed == 1)
}

/// Lock the pair if it is currently unlocked
///
/// The conditional update is the serialization point for finalize: of two
/// concurrent callers only one sees a changed row.
pub fn lock_if_unlocked(conn: &Connection, evaluator_id: i64, test_id: i64) -> Result<bool, StorageError> {
    let changed = conn.execute(
        "UPDATE evaluator_access SET locked = 1 WHERE evaluator_id = ? AND test_id = ? AND locked = 0",
        params![evaluator_id, test_id],
    )?;
    Ok(changed == 1)
}

/// Set visibility for a pair; returns false when no record exists
pub fn set_hidden(conn: &Connection, evaluator_id: i64, test_id: i64, hidden: bool) -> Result<bool, StorageError> {
    let changed = conn.execute(
        "UPDATE evaluator_access SET hidden = ? WHERE evaluator_id = ? AND test_id = ?",
        params![hidden, evaluator_id, test_id],
    )?;
    Ok(changed == 1)
}

/// Non-hidden accesses of an evaluator, newest first
pub fn list_visible(conn: &Connection, evaluator_id: i64) -> Result<Vec<AccessWithTest>, StorageError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT a.id, a.evaluator_id, a.test_id, a.locked, a.hidden, a.accessed_at,
               t.owner_id, t.owner_name, t.name, t.url, t.description, t.test_type,
               t.has_heuristics, t.code, t.created_at,
               (EXISTS(SELECT 1 FROM standard_responses s
                       WHERE s.evaluator_id = a.evaluator_id AND s.test_id = a.test_id AND s.complete = 1)
                OR EXISTS(SELECT 1 FROM heuristic_responses h
                       WHERE h.evaluator_id = a.evaluator_id AND h.test_id = a.test_id AND h.complete = 1)
               ) AS is_complete
        FROM evaluator_access a
        INNER JOIN design_tests t ON t.id = a.test_id
        WHERE a.evaluator_id = ? AND a.hidden = 0
        ORDER BY a.accessed_at DESC, a.id DESC
        "#,
    )?;

    let rows = stmt
        .query_map(params![evaluator_id], |row| {
            let access = AccessRow::from_row(row)?;
            let test_type: String = row.get("test_type")?;
            let test = DesignTestRow {
                id: access.test_id,
                owner_id: row.get("owner_id")?,
                owner_name: row.get("owner_name")?,
                name: row.get("name")?,
                url: row.get("url")?,
                description: row.get("description")?,
                test_type: TestType::parse(&test_type).unwrap_or(TestType::Web),
                has_heuristics: row.get("has_heuristics")?,
                code: row.get("code")?,
                created_at: row.get("created_at")?,
            };
            Ok(AccessWithTest {
                access,
                test,
                is_complete: row.get("is_complete")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Evaluator ids whose access to a test is locked, in lock order of their records
pub fn locked_evaluators(conn: &Connection, test_id: i64) -> Result<Vec<i64>, StorageError> {
    let mut stmt = conn.prepare(
        "SELECT evaluator_id FROM evaluator_access WHERE test_id = ? AND locked = 1 ORDER BY id",
    )?;
    let ids = stmt
        .query_map(params![test_id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(ids)
}
