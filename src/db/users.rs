//! User records (identity only, no credentials)

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Role a user plays in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "Administrador")]
    Administrator,
    #[serde(rename = "Propietario")]
    Owner,
    #[serde(rename = "Evaluador")]
    Evaluator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Administrator => "Administrador",
            Role::Owner => "Propietario",
            Role::Evaluator => "Evaluador",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Administrador" => Some(Role::Administrator),
            "Propietario" => Some(Role::Owner),
            "Evaluador" => Some(Role::Evaluator),
            _ => None,
        }
    }
}

/// Evaluator experience level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Experience {
    #[serde(rename = "Novato")]
    Novice,
    #[serde(rename = "Experto")]
    Expert,
}

impl Experience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Experience::Novice => "Novato",
            Experience::Expert => "Experto",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Novato" => Some(Experience::Novice),
            "Experto" => Some(Experience::Expert),
            _ => None,
        }
    }
}

/// User row from database
#[derive(Debug, Clone, Serialize)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub experience: Option<Experience>,
    pub created_at: String,
}

impl UserRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        let role: String = row.get("role")?;
        let experience: Option<String> = row.get("experience")?;
        Ok(Self {
            id: row.get("id")?,
            username: row.get("username")?,
            email: row.get("email")?,
            // CHECK constraints keep both columns inside the known values
            role: Role::parse(&role).unwrap_or(Role::Evaluator),
            experience: experience.as_deref().and_then(Experience::parse),
            created_at: row.get("created_at")?,
        })
    }

    pub fn is_evaluator(&self) -> bool {
        self.role == Role::Evaluator
    }
}

/// Input for creating a user
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub username: String,
    pub email: String,
    pub role: Role,
    pub experience: Option<Experience>,
}

/// Get user by ID
pub fn get_user(conn: &Connection, id: i64) -> Result<Option<UserRow>, StorageError> {
    let user = conn
        .query_row("SELECT * FROM users WHERE id = ?", params![id], UserRow::from_row)
        .optional()?;
    Ok(user)
}

/// Create a user
pub fn create_user(conn: &Connection, input: &CreateUserInput) -> Result<UserRow, StorageError> {
    conn.execute(
        "INSERT INTO users (username, email, role, experience) VALUES (?, ?, ?, ?)",
        params![
            input.username,
            input.email,
            input.role.as_str(),
            input.experience.map(|e| e.as_str()),
        ],
    )?;

    let id = conn.last_insert_rowid();
    get_user(conn, id)?
        .ok_or_else(|| StorageError::Internal("User not found after insert".to_string()))
}
