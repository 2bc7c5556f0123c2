//! Heuristic answers: one score per subprinciple, one comment per heuristic

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use crate::db::now_timestamp;
use crate::error::StorageError;

/// Subprinciple score joined with its heuristic and that heuristic's comment
#[derive(Debug, Clone, Serialize)]
pub struct HeuristicScoreRow {
    pub question_id: i64,
    pub heuristic_code: String,
    pub subprinciple_code: String,
    pub score: i64,
    /// Comment of the heuristic, if one was saved
    pub comment: Option<String>,
    pub complete: bool,
}

impl HeuristicScoreRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            question_id: row.get("question_id")?,
            heuristic_code: row.get("heuristic_code")?,
            subprinciple_code: row.get("subprinciple_code")?,
            score: row.get("score")?,
            comment: row.get("comment")?,
            complete: row.get("complete")?,
        })
    }
}

/// Insert or overwrite the score for (evaluator, test, question, subprinciple)
pub fn upsert_score(
    conn: &Connection,
    evaluator_id: i64,
    test_id: i64,
    question_id: i64,
    subprinciple_id: i64,
    score: i64,
    complete: bool,
) -> Result<(), StorageError> {
    conn.execute(
        r#"
        INSERT INTO heuristic_responses (
            evaluator_id, test_id, question_id, subprinciple_id, score, complete, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(evaluator_id, test_id, question_id, subprinciple_id) DO UPDATE SET
            score = excluded.score,
            complete = excluded.complete,
            updated_at = excluded.updated_at
        "#,
        params![evaluator_id, test_id, question_id, subprinciple_id, score, complete, now_timestamp()],
    )?;
    Ok(())
}

/// Insert or overwrite the comment for (evaluator, test, question, heuristic)
pub fn upsert_comment(
    conn: &Connection,
    evaluator_id: i64,
    test_id: i64,
    question_id: i64,
    heuristic_id: i64,
    comment: &str,
) -> Result<(), StorageError> {
    conn.execute(
        r#"
        INSERT INTO heuristic_comments (
            evaluator_id, test_id, question_id, heuristic_id, comment, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(evaluator_id, test_id, question_id, heuristic_id) DO UPDATE SET
            comment = excluded.comment,
            updated_at = excluded.updated_at
        "#,
        params![evaluator_id, test_id, question_id, heuristic_id, comment, now_timestamp()],
    )?;
    Ok(())
}

/// Mark every remaining draft score of the pair complete
pub fn complete_all(conn: &Connection, evaluator_id: i64, test_id: i64) -> Result<usize, StorageError> {
    let changed = conn.execute(
        "UPDATE heuristic_responses SET complete = 1 WHERE evaluator_id = ? AND test_id = ? AND complete = 0",
        params![evaluator_id, test_id],
    )?;
    Ok(changed)
}

/// Every score of the pair, optionally only complete ones
///
/// Ordered by question, heuristic code, subprinciple code.
pub fn list_for_evaluator(
    conn: &Connection,
    test_id: i64,
    evaluator_id: i64,
    only_complete: bool,
) -> Result<Vec<HeuristicScoreRow>, StorageError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT r.question_id, h.code AS heuristic_code, s.code AS subprinciple_code,
               r.score, r.complete, c.comment
        FROM heuristic_responses r
        INNER JOIN subprinciples s ON s.id = r.subprinciple_id
        INNER JOIN heuristics h ON h.id = s.heuristic_id
        LEFT JOIN heuristic_comments c
            ON c.evaluator_id = r.evaluator_id AND c.test_id = r.test_id
           AND c.question_id = r.question_id AND c.heuristic_id = h.id
        WHERE r.test_id = ? AND r.evaluator_id = ? AND (r.complete = 1 OR ? = 0)
        ORDER BY r.question_id, h.code, s.code
        "#,
    )?;
    let rows = stmt
        .query_map(params![test_id, evaluator_id, only_complete], HeuristicScoreRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
