//! Design service - users, design tests, questions and the heuristic catalog
//!
//! The authoring side the response lifecycle reads from. Question writes
//! enforce the response_type / heuristics exclusivity of their test.

use std::sync::Arc;

use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::MAX_CODE_LENGTH;
use crate::db::design_tests::{self, CreateDesignTestInput, DesignTestRow};
use crate::db::questions::{self, QuestionInput, QuestionRow};
use crate::db::users::{self, CreateUserInput, UserRow};
use crate::db::{catalog, SurveyDb};
use crate::error::StorageError;
use crate::views::{CreateDesignTestView, CreateUserView, HeuristicCatalogView, QuestionInputView};

/// Attempts at drawing an unused generated code
const CODE_ATTEMPTS: usize = 16;

/// Which response shape a request uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponsePath {
    Standard,
    Heuristic,
}

impl ResponsePath {
    fn expects_heuristics(self) -> bool {
        self == ResponsePath::Heuristic
    }
}

/// Load a test and check that it takes responses of the given shape
pub(crate) fn require_test(conn: &Connection, test_id: i64, path: ResponsePath) -> Result<DesignTestRow, StorageError> {
    let test = design_tests::get_design_test(conn, test_id)?
        .ok_or_else(|| StorageError::NotFound(format!("Design test {} not found", test_id)))?;

    if test.has_heuristics != path.expects_heuristics() {
        let expected = if test.has_heuristics { "heuristic" } else { "standard" };
        return Err(StorageError::InvalidInput(format!(
            "Design test {} takes {} responses",
            test_id, expected
        )));
    }
    Ok(test)
}

/// Authoring service
pub struct DesignService {
    db: Arc<SurveyDb>,
    code_length: usize,
}

impl DesignService {
    /// Create a new design service
    pub fn new(db: Arc<SurveyDb>, code_length: usize) -> Self {
        Self {
            db,
            code_length: code_length.clamp(1, MAX_CODE_LENGTH),
        }
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub fn create_user(&self, view: &CreateUserView) -> Result<UserRow, StorageError> {
        view.validate()?;
        let user = self.db.with_conn(|conn| {
            users::create_user(
                conn,
                &CreateUserInput {
                    username: view.username.trim().to_string(),
                    email: view.email.trim().to_string(),
                    role: view.role,
                    experience: view.experience,
                },
            )
        })?;
        info!(user_id = user.id, role = user.role.as_str(), "User created");
        Ok(user)
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>, StorageError> {
        self.db.with_conn(|conn| users::get_user(conn, id))
    }

    // =========================================================================
    // Design Tests
    // =========================================================================

    /// Create a design test, generating its code unless one is supplied
    pub fn create_test(&self, view: &CreateDesignTestView) -> Result<DesignTestRow, StorageError> {
        view.validate()?;

        let custom_code = match &view.code {
            Some(code) => {
                let code = code.trim();
                let length = code.chars().count();
                if length == 0 || length > MAX_CODE_LENGTH {
                    return Err(StorageError::InvalidInput(format!(
                        "Code must be 1 to {} characters",
                        MAX_CODE_LENGTH
                    )));
                }
                Some(code.to_string())
            }
            None => None,
        };

        let input = CreateDesignTestInput {
            owner_id: view.owner_id,
            owner_name: view.owner_name.clone(),
            name: view.name.trim().to_string(),
            url: view.url.trim().to_string(),
            description: view.description.clone(),
            test_type: view.test_type,
            has_heuristics: view.has_heuristics,
            code: custom_code.clone(),
        };

        let test = self.db.with_conn(|conn| {
            if let Some(owner_id) = input.owner_id {
                if users::get_user(conn, owner_id)?.is_none() {
                    return Err(StorageError::NotFound(format!("Owner {} not found", owner_id)));
                }
            }

            let code = match custom_code {
                Some(code) => {
                    if design_tests::code_exists(conn, &code)? {
                        return Err(StorageError::InvalidInput(format!("Code {} is already in use", code)));
                    }
                    code
                }
                None => self.unused_code(conn)?,
            };

            design_tests::insert_design_test(conn, &input, &code)
        })?;

        info!(
            test_id = test.id,
            code = %test.code,
            has_heuristics = test.has_heuristics,
            "Design test created"
        );
        Ok(test)
    }

    fn unused_code(&self, conn: &Connection) -> Result<String, StorageError> {
        for _ in 0..CODE_ATTEMPTS {
            let candidate = generate_code(self.code_length);
            if !design_tests::code_exists(conn, &candidate)? {
                return Ok(candidate);
            }
            debug!(code = %candidate, "Generated code collided, retrying");
        }
        Err(StorageError::Internal("Could not generate an unused test code".to_string()))
    }

    pub fn get_test(&self, id: i64) -> Result<Option<DesignTestRow>, StorageError> {
        self.db.with_conn(|conn| design_tests::get_design_test(conn, id))
    }

    pub fn code_available(&self, code: &str) -> Result<bool, StorageError> {
        self.db.with_conn(|conn| Ok(!design_tests::code_exists(conn, code)?))
    }

    fn existing_test(&self, conn: &Connection, test_id: i64) -> Result<DesignTestRow, StorageError> {
        design_tests::get_design_test(conn, test_id)?
            .ok_or_else(|| StorageError::NotFound(format!("Design test {} not found", test_id)))
    }

    // =========================================================================
    // Questions
    // =========================================================================

    pub fn list_questions(&self, test_id: i64) -> Result<Vec<QuestionRow>, StorageError> {
        self.db.with_conn(|conn| {
            self.existing_test(conn, test_id)?;
            questions::list_questions(conn, test_id)
        })
    }

    pub fn get_question(&self, test_id: i64, question_id: i64) -> Result<QuestionRow, StorageError> {
        self.db.with_conn(|conn| {
            self.existing_test(conn, test_id)?;
            questions::get_question(conn, test_id, question_id)?
                .ok_or_else(|| StorageError::NotFound(format!("Question {} not found in test {}", question_id, test_id)))
        })
    }

    pub fn create_question(&self, test_id: i64, view: &QuestionInputView) -> Result<QuestionRow, StorageError> {
        let question = self.db.with_conn_mut(|conn| {
            let test = self.existing_test(conn, test_id)?;
            let input = question_input(conn, &test, view)?;
            questions::create_question(conn, test_id, &input)
        })?;
        info!(test_id, question_id = question.id, "Question created");
        Ok(question)
    }

    /// Replace a question's fields and heuristic links
    pub fn update_question(
        &self,
        test_id: i64,
        question_id: i64,
        view: &QuestionInputView,
    ) -> Result<QuestionRow, StorageError> {
        let question = self.db.with_conn_mut(|conn| {
            let test = self.existing_test(conn, test_id)?;
            let input = question_input(conn, &test, view)?;
            questions::update_question(conn, test_id, question_id, &input)?
                .ok_or_else(|| StorageError::NotFound(format!("Question {} not found in test {}", question_id, test_id)))
        })?;
        info!(test_id, question_id, "Question updated");
        Ok(question)
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    /// Every heuristic with its subprinciples, ordered by code
    pub fn list_catalog(&self) -> Result<Vec<HeuristicCatalogView>, StorageError> {
        self.db.with_conn(|conn| {
            catalog::list_heuristics(conn)?
                .into_iter()
                .map(|heuristic| -> Result<HeuristicCatalogView, StorageError> {
                    let subprinciples = catalog::list_subprinciples(conn, heuristic.id)?;
                    Ok(HeuristicCatalogView { heuristic, subprinciples })
                })
                .collect()
        })
    }
}

/// Validate a question body against its test and resolve heuristic codes
fn question_input(conn: &Connection, test: &DesignTestRow, view: &QuestionInputView) -> Result<QuestionInput, StorageError> {
    view.validate_for(test.has_heuristics)?;

    let heuristic_ids = view
        .heuristics
        .iter()
        .map(|code| {
            catalog::get_heuristic_by_code(conn, code)?
                .map(|h| h.id)
                .ok_or_else(|| StorageError::NotFound(format!("Heuristic {} not found", code)))
        })
        .collect::<Result<Vec<_>, StorageError>>()?;

    Ok(QuestionInput {
        title: view.title.trim().to_string(),
        description: view.description.clone(),
        url_frame: view.url_frame.clone(),
        response_type: view.response_type,
        heuristic_ids,
    })
}

/// Leading characters of a v4 UUID, uppercased
fn generate_code(length: usize) -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(length)
        .collect::<String>()
        .to_uppercase()
}
