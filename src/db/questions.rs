//! Design question CRUD operations

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::catalog::HeuristicRow;
use crate::error::StorageError;

/// Fixed scale a standard question is answered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseType {
    #[serde(rename = "Calificacion")]
    Rating,
    #[serde(rename = "Legibilidad")]
    Readability,
    #[serde(rename = "Coherencia")]
    Coherence,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Rating => "Calificacion",
            ResponseType::Readability => "Legibilidad",
            ResponseType::Coherence => "Coherencia",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Calificacion" => Some(ResponseType::Rating),
            "Legibilidad" => Some(ResponseType::Readability),
            "Coherencia" => Some(ResponseType::Coherence),
            _ => None,
        }
    }
}

/// Question row from database
#[derive(Debug, Clone, Serialize)]
pub struct QuestionRow {
    pub id: i64,
    pub test_id: i64,
    pub title: String,
    pub description: String,
    pub url_frame: String,
    pub response_type: Option<ResponseType>,
    /// Codes of linked heuristics, ordered
    pub heuristics: Vec<String>,
}

impl QuestionRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let response_type: Option<String> = row.get("response_type")?;
        Ok(Self {
            id: row.get("id")?,
            test_id: row.get("test_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            url_frame: row.get("url_frame")?,
            response_type: response_type.as_deref().and_then(ResponseType::parse),
            heuristics: vec![], // Loaded separately
        })
    }
}

/// Validated question fields, written as a whole on create and update
#[derive(Debug, Clone)]
pub struct QuestionInput {
    pub title: String,
    pub description: String,
    pub url_frame: String,
    pub response_type: Option<ResponseType>,
    /// Resolved heuristic ids
    pub heuristic_ids: Vec<i64>,
}

/// Get a question, scoped to its test
pub fn get_question(conn: &Connection, test_id: i64, question_id: i64) -> Result<Option<QuestionRow>, StorageError> {
    let question = conn
        .query_row(
            "SELECT * FROM design_questions WHERE id = ? AND test_id = ?",
            params![question_id, test_id],
            QuestionRow::from_row,
        )
        .optional()?;

    match question {
        Some(mut q) => {
            q.heuristics = question_heuristics(conn, q.id)?
                .into_iter()
                .map(|h| h.code)
                .collect();
            Ok(Some(q))
        }
        None => Ok(None),
    }
}

/// List the questions of a test in creation order
pub fn list_questions(conn: &Connection, test_id: i64) -> Result<Vec<QuestionRow>, StorageError> {
    let mut stmt = conn.prepare("SELECT * FROM design_questions WHERE test_id = ? ORDER BY id")?;
    let mut questions = stmt
        .query_map(params![test_id], QuestionRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    for q in &mut questions {
        q.heuristics = question_heuristics(conn, q.id)?
            .into_iter()
            .map(|h| h.code)
            .collect();
    }

    Ok(questions)
}

/// Heuristics linked to a question, ordered by code
pub fn question_heuristics(conn: &Connection, question_id: i64) -> Result<Vec<HeuristicRow>, StorageError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT h.id, h.code, h.title, h.description
        FROM heuristics h
        INNER JOIN question_heuristics qh ON qh.heuristic_id = h.id
        WHERE qh.question_id = ?
        ORDER BY h.code
        "#,
    )?;
    let rows = stmt
        .query_map(params![question_id], |row| {
            Ok(HeuristicRow {
                id: row.get("id")?,
                code: row.get("code")?,
                title: row.get("title")?,
                description: row.get("description")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Create a question with its heuristic links
pub fn create_question(conn: &mut Connection, test_id: i64, input: &QuestionInput) -> Result<QuestionRow, StorageError> {
    let tx = conn.transaction()?;

    tx.execute(
        r#"
        INSERT INTO design_questions (test_id, title, description, url_frame, response_type)
        VALUES (?, ?, ?, ?, ?)
        "#,
        params![
            test_id,
            input.title,
            input.description,
            input.url_frame,
            input.response_type.map(|r| r.as_str()),
        ],
    )?;
    let question_id = tx.last_insert_rowid();
    link_heuristics(&tx, question_id, &input.heuristic_ids)?;

    tx.commit()?;

    get_question(conn, test_id, question_id)?
        .ok_or_else(|| StorageError::Internal("Question not found after insert".to_string()))
}

/// Replace a question's fields and heuristic links
pub fn update_question(
    conn: &mut Connection,
    test_id: i64,
    question_id: i64,
    input: &QuestionInput,
) -> Result<Option<QuestionRow>, StorageError> {
    let tx = conn.transaction()?;

    let updated = tx.execute(
        r#"
        UPDATE design_questions
        SET title = ?, description = ?, url_frame = ?, response_type = ?
        WHERE id = ? AND test_id = ?
        "#,
        params![
            input.title,
            input.description,
            input.url_frame,
            input.response_type.map(|r| r.as_str()),
            question_id,
            test_id,
        ],
    )?;
    if updated == 0 {
        return Ok(None);
    }

    tx.execute(
        "DELETE FROM question_heuristics WHERE question_id = ?",
        params![question_id],
    )?;
    link_heuristics(&tx, question_id, &input.heuristic_ids)?;

    tx.commit()?;

    get_question(conn, test_id, question_id)
}

fn link_heuristics(conn: &Connection, question_id: i64, heuristic_ids: &[i64]) -> Result<(), StorageError> {
    for heuristic_id in heuristic_ids {
        conn.execute(
            "INSERT OR IGNORE INTO question_heuristics (question_id, heuristic_id) VALUES (?, ?)",
            params![question_id, heuristic_id],
        )?;
    }
    Ok(())
}
