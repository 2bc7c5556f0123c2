//! Standard response service
//!
//! Drafts and finalization for tests without heuristics. Each question is
//! answered with one value on the question's response type scale.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info};

use crate::db::standard_responses::{self, StandardAnswer};
use crate::db::{access, questions, users, SurveyDb};
use crate::error::StorageError;
use crate::views::{
    EvaluatorView, FinalizeResultView, QuestionSummaryView, StandardAnswerReportView,
    StandardAnswerView, StandardDraftView, StandardEvaluatorReportView, StandardFinalizeView,
    StandardQuestionReportView, StandardReportView,
};

use super::access_service::{require_access, require_writable};
use super::design_service::{require_test, ResponsePath};
use super::events::{EventBus, ResponseKind, SurveyEvent};

/// Standard response service
pub struct StandardResponseService {
    db: Arc<SurveyDb>,
    events: Arc<EventBus>,
}

impl StandardResponseService {
    /// Create a new standard response service
    pub fn new(db: Arc<SurveyDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    // =========================================================================
    // Drafts
    // =========================================================================

    /// Upsert draft answers; a repeated question overwrites the earlier value
    pub fn save_partial(
        &self,
        test_id: i64,
        evaluator_id: i64,
        responses: &[StandardAnswerView],
    ) -> Result<usize, StorageError> {
        if responses.is_empty() {
            return Err(StorageError::InvalidInput("'responses' must not be empty".to_string()));
        }
        validate_answers(responses)?;

        let count = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            require_test(&tx, test_id, ResponsePath::Standard)?;
            require_writable(&tx, evaluator_id, test_id)?;

            let answers = resolve_answers(&tx, test_id, responses)?;
            for answer in &answers {
                standard_responses::upsert(&tx, evaluator_id, test_id, answer, false)?;
            }

            tx.commit()?;
            Ok(answers.len())
        })?;

        info!(evaluator_id, test_id, count, "Standard draft saved");
        self.events.emit(SurveyEvent::DraftSaved {
            evaluator_id,
            test_id,
            kind: ResponseKind::Standard,
            count,
        });

        Ok(count)
    }

    /// Answers saved so far, with their questions
    pub fn get_partial(&self, test_id: i64, evaluator_id: i64) -> Result<Vec<StandardDraftView>, StorageError> {
        self.db.with_conn(|conn| {
            require_test(conn, test_id, ResponsePath::Standard)?;
            require_access(conn, evaluator_id, test_id)?;

            let questions: HashMap<i64, QuestionSummaryView> = questions::list_questions(conn, test_id)?
                .iter()
                .map(|q| (q.id, QuestionSummaryView::from(q)))
                .collect();

            let rows = standard_responses::list_for_evaluator(conn, test_id, evaluator_id, false)?;
            rows.into_iter()
                .map(|row| -> Result<StandardDraftView, StorageError> {
                    let question = questions.get(&row.question_id).cloned().ok_or_else(|| {
                        StorageError::Internal(format!("Response for unknown question {}", row.question_id))
                    })?;
                    Ok(StandardDraftView {
                        question,
                        response_value: row.response_value,
                        comment: row.comment,
                        complete: row.complete,
                    })
                })
                .collect()
        })
    }

    // =========================================================================
    // Finalization
    // =========================================================================

    /// Write the submitted answers as complete, complete every earlier draft
    /// and lock the access, all in one transaction
    pub fn finalize(&self, test_id: i64, request: &StandardFinalizeView) -> Result<FinalizeResultView, StorageError> {
        let evaluator_id = request.evaluator_id;
        validate_answers(&request.responses)?;

        let finalized = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            require_test(&tx, test_id, ResponsePath::Standard)?;
            require_writable(&tx, evaluator_id, test_id)?;
            let answers = resolve_answers(&tx, test_id, &request.responses)?;

            if !access::lock_if_unlocked(&tx, evaluator_id, test_id)? {
                return Err(StorageError::Forbidden(format!(
                    "Access of evaluator {} to test {} is already locked",
                    evaluator_id, test_id
                )));
            }
            for answer in &answers {
                standard_responses::upsert(&tx, evaluator_id, test_id, answer, true)?;
            }
            let drafts = standard_responses::complete_all(&tx, evaluator_id, test_id)?;

            tx.commit()?;
            Ok(answers.len() + drafts)
        })?;

        info!(evaluator_id, test_id, count = finalized, path = "standard", "Responses finalized");
        self.events.emit(SurveyEvent::ResponsesFinalized {
            evaluator_id,
            test_id,
            kind: ResponseKind::Standard,
            count: finalized,
        });

        Ok(FinalizeResultView {
            test_id,
            evaluator_id,
            locked: true,
            finalized,
        })
    }

    /// Complete answers of every locked evaluator, one entry per question
    pub fn finalize_report(&self, test_id: i64) -> Result<StandardReportView, StorageError> {
        self.db.with_conn(|conn| {
            let test = require_test(conn, test_id, ResponsePath::Standard)?;
            let questions = questions::list_questions(conn, test_id)?;
            let evaluator_ids = access::locked_evaluators(conn, test_id)?;
            debug!(test_id, evaluators = evaluator_ids.len(), "Building standard report");

            let mut evaluators = Vec::with_capacity(evaluator_ids.len());
            for evaluator_id in evaluator_ids {
                let user = users::get_user(conn, evaluator_id)?
                    .ok_or_else(|| StorageError::Internal(format!("Access for unknown user {}", evaluator_id)))?;

                let mut answers: HashMap<i64, StandardAnswerReportView> =
                    standard_responses::list_for_evaluator(conn, test_id, evaluator_id, true)?
                        .into_iter()
                        .map(|row| {
                            (
                                row.question_id,
                                StandardAnswerReportView {
                                    response_type: row.response_type,
                                    response_value: row.response_value,
                                    comment: row.comment,
                                },
                            )
                        })
                        .collect();

                let responses = questions
                    .iter()
                    .map(|q| StandardQuestionReportView {
                        question: QuestionSummaryView::from(q),
                        response: answers.remove(&q.id),
                    })
                    .collect();

                evaluators.push(StandardEvaluatorReportView {
                    evaluator: EvaluatorView::from(user),
                    responses,
                });
            }

            Ok(StandardReportView { test, evaluators })
        })
    }
}

fn validate_answers(responses: &[StandardAnswerView]) -> Result<(), StorageError> {
    responses.iter().try_for_each(StandardAnswerView::validate)
}

/// Check every answer against the questions of the test
fn resolve_answers(
    conn: &Connection,
    test_id: i64,
    responses: &[StandardAnswerView],
) -> Result<Vec<StandardAnswer>, StorageError> {
    responses
        .iter()
        .map(|view| -> Result<StandardAnswer, StorageError> {
            let question = questions::get_question(conn, test_id, view.question_id)?.ok_or_else(|| {
                StorageError::NotFound(format!(
                    "Question {} not found in test {}",
                    view.question_id, test_id
                ))
            })?;
            let response_type = question.response_type.ok_or_else(|| {
                StorageError::InvalidInput(format!("Question {} has no response type", question.id))
            })?;
            Ok(StandardAnswer {
                question_id: question.id,
                response_type,
                response_value: view.response_value,
                comment: view.comment.clone().unwrap_or_default(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::questions::{QuestionInput, ResponseType};
    use crate::db::test_support;

    struct Fixture {
        service: StandardResponseService,
        db: Arc<SurveyDb>,
        evaluator: i64,
        test: i64,
        question: i64,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(SurveyDb::open_in_memory().unwrap());
        let (evaluator, test, question) = db
            .with_conn_mut(|conn| {
                let e = test_support::evaluator(conn, "eva");
                let t = test_support::design_test(conn, "ABCDEF1234", false);
                let q = questions::create_question(
                    conn,
                    t,
                    &QuestionInput {
                        title: "Q1".into(),
                        description: String::new(),
                        url_frame: String::new(),
                        response_type: Some(ResponseType::Rating),
                        heuristic_ids: vec![],
                    },
                )?;
                access::insert_unlocked(conn, e, t)?;
                Ok((e, t, q.id))
            })
            .unwrap();
        Fixture {
            service: StandardResponseService::new(db.clone(), Arc::new(EventBus::new())),
            db,
            evaluator,
            test,
            question,
        }
    }

    fn answer(question_id: i64, value: i64) -> StandardAnswerView {
        StandardAnswerView {
            question_id,
            response_value: value,
            comment: None,
        }
    }

    #[test]
    fn test_partial_save_is_last_write_wins() {
        let f = fixture();
        f.service.save_partial(f.test, f.evaluator, &[answer(f.question, 2)]).unwrap();
        f.service.save_partial(f.test, f.evaluator, &[answer(f.question, 4)]).unwrap();

        let drafts = f.service.get_partial(f.test, f.evaluator).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].response_value, 4);
        assert!(!drafts[0].complete);
        assert_eq!(drafts[0].question.question_id, f.question);
    }

    #[test]
    fn test_unknown_question_writes_nothing() {
        let f = fixture();
        let result = f.service.save_partial(
            f.test,
            f.evaluator,
            &[answer(f.question, 3), answer(f.question + 99, 1)],
        );
        assert!(matches!(result, Err(StorageError::NotFound(_))));
        assert_eq!(f.db.stats().unwrap().standard_response_count, 0);
    }

    #[test]
    fn test_finalize_twice_is_forbidden() {
        let f = fixture();
        let request = StandardFinalizeView {
            evaluator_id: f.evaluator,
            responses: vec![answer(f.question, 4)],
        };

        let result = f.service.finalize(f.test, &request).unwrap();
        assert!(result.locked);
        assert_eq!(result.finalized, 1);

        assert!(matches!(f.service.finalize(f.test, &request), Err(StorageError::Forbidden(_))));
        assert!(matches!(
            f.service.save_partial(f.test, f.evaluator, &[answer(f.question, 1)]),
            Err(StorageError::Forbidden(_))
        ));
    }

    #[test]
    fn test_failed_finalize_leaves_access_open() {
        let f = fixture();
        let request = StandardFinalizeView {
            evaluator_id: f.evaluator,
            responses: vec![answer(f.question + 99, 4)],
        };
        assert!(f.service.finalize(f.test, &request).is_err());

        let access = f
            .db
            .with_conn(|conn| access::find_access(conn, f.evaluator, f.test))
            .unwrap()
            .unwrap();
        assert!(!access.locked);
    }

    #[test]
    fn test_finalize_completes_earlier_drafts() {
        let f = fixture();
        f.service.save_partial(f.test, f.evaluator, &[answer(f.question, 5)]).unwrap();

        let request = StandardFinalizeView {
            evaluator_id: f.evaluator,
            responses: vec![],
        };
        assert_eq!(f.service.finalize(f.test, &request).unwrap().finalized, 1);

        let report = f.service.finalize_report(f.test).unwrap();
        let answer = report.evaluators[0].responses[0].response.as_ref().unwrap();
        assert_eq!(answer.response_value, 5);
    }

    #[test]
    fn test_heuristic_test_is_rejected() {
        let f = fixture();
        let heuristic_test = f
            .db
            .with_conn(|conn| Ok(test_support::design_test(conn, "HEUR000001", true)))
            .unwrap();
        assert!(matches!(
            f.service.get_partial(heuristic_test, f.evaluator),
            Err(StorageError::InvalidInput(_))
        ));
    }
}
