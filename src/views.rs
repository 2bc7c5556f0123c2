//! View types for the HTTP API boundary
//!
//! Request bodies are explicit structs with `deny_unknown_fields`, so a
//! payload with a missing or unexpected field fails deserialization (400)
//! before any store access. Shape checks that serde cannot express live in
//! the `validate` methods.
//!
//! Response views flatten repository rows into the JSON the clients read.

use serde::{Deserialize, Serialize};

use crate::db::access::AccessWithTest;
use crate::db::catalog::{HeuristicRow, SubprincipleRow};
use crate::db::design_tests::{DesignTestRow, TestType};
use crate::db::questions::{QuestionRow, ResponseType};
use crate::db::users::{Experience, Role, UserRow};
use crate::db::AccessRow;
use crate::error::StorageError;

/// Longest comment accepted on a standard answer
pub const MAX_COMMENT_LENGTH: usize = 200;

fn require_text(field: &str, value: &str) -> Result<(), StorageError> {
    if value.trim().is_empty() {
        return Err(StorageError::InvalidInput(format!("'{}' is required", field)));
    }
    Ok(())
}

// ============================================================================
// Authoring Inputs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserView {
    pub username: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub experience: Option<Experience>,
}

impl CreateUserView {
    pub fn validate(&self) -> Result<(), StorageError> {
        require_text("username", &self.username)?;
        if !self.email.contains('@') {
            return Err(StorageError::InvalidInput(format!("Invalid email '{}'", self.email)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateDesignTestView {
    #[serde(default)]
    pub owner_id: Option<i64>,
    #[serde(default)]
    pub owner_name: Option<String>,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    pub test_type: TestType,
    pub has_heuristics: bool,
    #[serde(default)]
    pub code: Option<String>,
}

impl CreateDesignTestView {
    pub fn validate(&self) -> Result<(), StorageError> {
        require_text("name", &self.name)?;
        require_text("url", &self.url)
    }
}

/// Question body, used for both create and full update
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuestionInputView {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url_frame: String,
    #[serde(default)]
    pub response_type: Option<ResponseType>,
    /// Heuristic codes
    #[serde(default)]
    pub heuristics: Vec<String>,
}

impl QuestionInputView {
    /// Enforce the response_type / heuristics exclusivity for a test
    pub fn validate_for(&self, has_heuristics: bool) -> Result<(), StorageError> {
        require_text("title", &self.title)?;
        if has_heuristics {
            if self.response_type.is_some() {
                return Err(StorageError::InvalidInput(
                    "A question of a heuristic test cannot have a response_type".to_string(),
                ));
            }
            if self.heuristics.is_empty() {
                return Err(StorageError::InvalidInput(
                    "A question of a heuristic test needs at least one heuristic".to_string(),
                ));
            }
        } else {
            if !self.heuristics.is_empty() {
                return Err(StorageError::InvalidInput(
                    "A question of a standard test cannot link heuristics".to_string(),
                ));
            }
            if self.response_type.is_none() {
                return Err(StorageError::InvalidInput(
                    "A question of a standard test needs a response_type".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Access Inputs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedeemCodeView {
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VisibilityView {
    pub evaluator_id: i64,
}

// ============================================================================
// Standard Response Inputs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StandardAnswerView {
    pub question_id: i64,
    pub response_value: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

impl StandardAnswerView {
    pub fn validate(&self) -> Result<(), StorageError> {
        if let Some(comment) = &self.comment {
            if comment.chars().count() > MAX_COMMENT_LENGTH {
                return Err(StorageError::InvalidInput(format!(
                    "Comment for question {} exceeds {} characters",
                    self.question_id, MAX_COMMENT_LENGTH
                )));
            }
        }
        Ok(())
    }
}

/// Partial save body for the standard path
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StandardDraftInputView {
    pub responses: Vec<StandardAnswerView>,
}

/// Finalize body for the standard path
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StandardFinalizeView {
    pub evaluator_id: i64,
    #[serde(default)]
    pub responses: Vec<StandardAnswerView>,
}

// ============================================================================
// Heuristic Response Inputs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubprincipleScoreView {
    pub subprinciple_code: String,
    pub response_value: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeuristicAnswerView {
    pub heuristic_code: String,
    #[serde(default)]
    pub comment: Option<String>,
    pub subprinciples: Vec<SubprincipleScoreView>,
}

/// All heuristic answers given to one question
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeuristicQuestionView {
    pub question_id: i64,
    pub heuristics: Vec<HeuristicAnswerView>,
}

impl HeuristicQuestionView {
    pub fn validate(&self) -> Result<(), StorageError> {
        if self.heuristics.is_empty() {
            return Err(StorageError::InvalidInput(format!(
                "Question {} has no heuristic answers",
                self.question_id
            )));
        }
        for heuristic in &self.heuristics {
            if heuristic.subprinciples.is_empty() {
                return Err(StorageError::InvalidInput(format!(
                    "Heuristic {} of question {} has no subprinciple scores",
                    heuristic.heuristic_code, self.question_id
                )));
            }
        }
        Ok(())
    }
}

/// Partial save body for the heuristic path
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeuristicDraftInputView {
    pub responses: Vec<HeuristicQuestionView>,
}

/// Finalize body for the heuristic path
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeuristicFinalizeView {
    pub evaluator_id: i64,
    #[serde(default)]
    pub responses: Vec<HeuristicQuestionView>,
}

// ============================================================================
// Output Views
// ============================================================================

/// Access record as returned by redemption and visibility changes
#[derive(Debug, Clone, Serialize)]
pub struct AccessView {
    pub id: i64,
    pub evaluator_id: i64,
    pub test_id: i64,
    pub locked: bool,
    pub hidden: bool,
    pub accessed_at: String,
}

impl From<AccessRow> for AccessView {
    fn from(a: AccessRow) -> Self {
        Self {
            id: a.id,
            evaluator_id: a.evaluator_id,
            test_id: a.test_id,
            locked: a.locked,
            hidden: a.hidden,
            accessed_at: a.accessed_at,
        }
    }
}

/// One entry of an evaluator's test list
#[derive(Debug, Clone, Serialize)]
pub struct AccessSummaryView {
    pub test_id: i64,
    pub name: String,
    pub url: String,
    pub description: String,
    pub test_type: TestType,
    pub has_heuristics: bool,
    pub code: String,
    pub locked: bool,
    pub accessed_at: String,
    pub is_complete: bool,
}

impl From<AccessWithTest> for AccessSummaryView {
    fn from(a: AccessWithTest) -> Self {
        Self {
            test_id: a.test.id,
            name: a.test.name,
            url: a.test.url,
            description: a.test.description,
            test_type: a.test.test_type,
            has_heuristics: a.test.has_heuristics,
            code: a.test.code,
            locked: a.access.locked,
            accessed_at: a.access.accessed_at,
            is_complete: a.is_complete,
        }
    }
}

/// Question fields repeated inside drafts and reports
#[derive(Debug, Clone, Serialize)]
pub struct QuestionSummaryView {
    pub question_id: i64,
    pub title: String,
    pub description: String,
    pub url_frame: String,
    pub response_type: Option<ResponseType>,
}

impl From<&QuestionRow> for QuestionSummaryView {
    fn from(q: &QuestionRow) -> Self {
        Self {
            question_id: q.id,
            title: q.title.clone(),
            description: q.description.clone(),
            url_frame: q.url_frame.clone(),
            response_type: q.response_type,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluatorView {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub experience: Option<Experience>,
}

impl From<UserRow> for EvaluatorView {
    fn from(u: UserRow) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            experience: u.experience,
        }
    }
}

/// Saved standard answer with its question
#[derive(Debug, Clone, Serialize)]
pub struct StandardDraftView {
    pub question: QuestionSummaryView,
    pub response_value: i64,
    pub comment: String,
    pub complete: bool,
}

/// Saved heuristic score, flat; callers group by heuristic
#[derive(Debug, Clone, Serialize)]
pub struct HeuristicDraftView {
    pub question_id: i64,
    pub heuristic_code: String,
    pub subprinciple_code: String,
    pub response_value: i64,
    pub comment: Option<String>,
    pub complete: bool,
}

/// Result of a partial save
#[derive(Debug, Clone, Serialize)]
pub struct SaveResultView {
    pub test_id: i64,
    pub evaluator_id: i64,
    pub saved: usize,
}

/// Result of a finalize
#[derive(Debug, Clone, Serialize)]
pub struct FinalizeResultView {
    pub test_id: i64,
    pub evaluator_id: i64,
    pub locked: bool,
    /// Rows marked complete, submitted and earlier drafts together
    pub finalized: usize,
}

// ============================================================================
// Report Views
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StandardAnswerReportView {
    pub response_type: ResponseType,
    pub response_value: i64,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StandardQuestionReportView {
    pub question: QuestionSummaryView,
    /// Null when the evaluator finalized without answering
    pub response: Option<StandardAnswerReportView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StandardEvaluatorReportView {
    pub evaluator: EvaluatorView,
    pub responses: Vec<StandardQuestionReportView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StandardReportView {
    pub test: DesignTestRow,
    pub evaluators: Vec<StandardEvaluatorReportView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubprincipleReportView {
    pub subprinciple_code: String,
    pub subtitle: String,
    pub response_value: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeuristicReportView {
    pub heuristic_code: String,
    pub title: String,
    pub comment: Option<String>,
    pub subprinciples: Vec<SubprincipleReportView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeuristicQuestionReportView {
    pub question: QuestionSummaryView,
    pub heuristics: Vec<HeuristicReportView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeuristicEvaluatorReportView {
    pub evaluator: EvaluatorView,
    pub questions: Vec<HeuristicQuestionReportView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeuristicResponsesReportView {
    pub test: DesignTestRow,
    pub evaluators: Vec<HeuristicEvaluatorReportView>,
}

// ============================================================================
// Catalog and Test Views
// ============================================================================

/// Heuristic with its subprinciples
#[derive(Debug, Clone, Serialize)]
pub struct HeuristicCatalogView {
    #[serde(flatten)]
    pub heuristic: HeuristicRow,
    pub subprinciples: Vec<SubprincipleRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeAvailabilityView {
    pub code: String,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestHeuristicsFlagView {
    pub test_id: i64,
    pub has_heuristics: bool,
}
