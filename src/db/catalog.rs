//! Heuristic catalog queries
//!
//! Rows are only written by the seed step. Everything else reads by code.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::error::StorageError;

/// Heuristic row from database
#[derive(Debug, Clone, Serialize)]
pub struct HeuristicRow {
    #[serde(skip)]
    pub id: i64,
    pub code: String,
    pub title: String,
    pub description: String,
}

impl HeuristicRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            code: row.get("code")?,
            title: row.get("title")?,
            description: row.get("description")?,
        })
    }
}

/// Subprinciple row, carrying the code of its heuristic
#[derive(Debug, Clone, Serialize)]
pub struct SubprincipleRow {
    #[serde(skip)]
    pub id: i64,
    pub code: String,
    pub subtitle: String,
    pub description: String,
    pub example: String,
    #[serde(skip)]
    pub heuristic_id: i64,
    pub heuristic_code: String,
}

impl SubprincipleRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            code: row.get("code")?,
            subtitle: row.get("subtitle")?,
            description: row.get("description")?,
            example: row.get("example")?,
            heuristic_id: row.get("heuristic_id")?,
            heuristic_code: row.get("heuristic_code")?,
        })
    }
}

const SUBPRINCIPLE_SELECT: &str = r#"
    SELECT s.id, s.code, s.subtitle, s.description, s.example, s.heuristic_id,
           h.code AS heuristic_code
    FROM subprinciples s
    INNER JOIN heuristics h ON h.id = s.heuristic_id
"#;

/// Get heuristic by code
pub fn get_heuristic_by_code(conn: &Connection, code: &str) -> Result<Option<HeuristicRow>, StorageError> {
    let row = conn
        .query_row(
            "SELECT * FROM heuristics WHERE code = ?",
            params![code],
            HeuristicRow::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Get subprinciple by code
pub fn get_subprinciple_by_code(conn: &Connection, code: &str) -> Result<Option<SubprincipleRow>, StorageError> {
    let sql = format!("{} WHERE s.code = ?", SUBPRINCIPLE_SELECT);
    let row = conn
        .query_row(&sql, params![code], SubprincipleRow::from_row)
        .optional()?;
    Ok(row)
}

/// List every heuristic ordered by code
pub fn list_heuristics(conn: &Connection) -> Result<Vec<HeuristicRow>, StorageError> {
    let mut stmt = conn.prepare("SELECT * FROM heuristics ORDER BY code")?;
    let rows = stmt
        .query_map([], HeuristicRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// List subprinciples of one heuristic ordered by code
pub fn list_subprinciples(conn: &Connection, heuristic_id: i64) -> Result<Vec<SubprincipleRow>, StorageError> {
    let sql = format!("{} WHERE s.heuristic_id = ? ORDER BY s.code", SUBPRINCIPLE_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![heuristic_id], SubprincipleRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert or refresh a heuristic by code, returning its stable id
pub fn upsert_heuristic(
    conn: &Connection,
    code: &str,
    title: &str,
    description: &str,
) -> Result<i64, StorageError> {
    let id = conn.query_row(
        r#"
        INSERT INTO heuristics (code, title, description) VALUES (?, ?, ?)
        ON CONFLICT(code) DO UPDATE SET
            title = excluded.title,
            description = excluded.description
        RETURNING id
        "#,
        params![code, title, description],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Insert or refresh a subprinciple by code
pub fn upsert_subprinciple(
    conn: &Connection,
    heuristic_id: i64,
    code: &str,
    subtitle: &str,
    description: &str,
    example: &str,
) -> Result<i64, StorageError> {
    let id = conn.query_row(
        r#"
        INSERT INTO subprinciples (code, subtitle, description, example, heuristic_id)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(code) DO UPDATE SET
            subtitle = excluded.subtitle,
            description = excluded.description,
            example = excluded.example,
            heuristic_id = excluded.heuristic_id
        RETURNING id
        "#,
        params![code, subtitle, description, example, heuristic_id],
        |row| row.get(0),
    )?;
    Ok(id)
}
