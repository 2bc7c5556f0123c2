//! Standard (response-type scored) answers

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::db::now_timestamp;
use crate::db::questions::ResponseType;
use crate::error::StorageError;

/// Standard response row from database
#[derive(Debug, Clone, Serialize)]
pub struct StandardResponseRow {
    pub question_id: i64,
    pub response_type: ResponseType,
    pub response_value: i64,
    pub comment: String,
    pub complete: bool,
    pub updated_at: String,
}

impl StandardResponseRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let response_type: String = row.get("response_type")?;
        Ok(Self {
            question_id: row.get("question_id")?,
            response_type: ResponseType::parse(&response_type).unwrap_or(ResponseType::Rating),
            response_value: row.get("response_value")?,
            comment: row.get("comment")?,
            complete: row.get("complete")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// One answer ready to be written
#[derive(Debug, Clone)]
pub struct StandardAnswer {
    pub question_id: i64,
    pub response_type: ResponseType,
    pub response_value: i64,
    pub comment: String,
}

/// Insert or overwrite the answer for (evaluator, test, question)
pub fn upsert(
    conn: &Connection,
    evaluator_id: i64,
    test_id: i64,
    answer: &StandardAnswer,
    complete: bool,
) -> Result<(), StorageError> {
    conn.execute(
        r#"
        INSERT INTO standard_responses (
            evaluator_id, test_id, question_id, response_type, response_value, comment, complete, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(evaluator_id, test_id, question_id) DO UPDATE SET
            response_type = excluded.response_type,
            response_value = excluded.response_value,
            comment = excluded.comment,
            complete = excluded.complete,
            updated_at = excluded.updated_at
        "#,
        params![
            evaluator_id,
            test_id,
            answer.question_id,
            answer.response_type.as_str(),
            answer.response_value,
            answer.comment,
            complete,
            now_timestamp(),
        ],
    )?;
    Ok(())
}

/// Mark every remaining draft of the pair complete
pub fn complete_all(conn: &Connection, evaluator_id: i64, test_id: i64) -> Result<usize, StorageError> {
    let changed = conn.execute(
        "UPDATE standard_responses SET complete = 1 WHERE evaluator_id = ? AND test_id = ? AND complete = 0",
        params![evaluator_id, test_id],
    )?;
    Ok(changed)
}

/// Every answer of the pair, optionally only complete ones, ordered by question
pub fn list_for_evaluator(
    conn: &Connection,
    test_id: i64,
    evaluator_id: i64,
    only_complete: bool,
) -> Result<Vec<StandardResponseRow>, StorageError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT * FROM standard_responses
        WHERE test_id = ? AND evaluator_id = ? AND (complete = 1 OR ? = 0)
        ORDER BY question_id
        "#,
    )?;
    let rows = stmt
        .query_map(params![test_id, evaluator_id, only_complete], StandardResponseRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
