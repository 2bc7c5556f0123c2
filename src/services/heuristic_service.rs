//! Heuristic response service
//!
//! Drafts and finalization for tests with heuristics. An answer to a
//! question is a set of subprinciple scores grouped under the heuristics the
//! question links, plus at most one comment per heuristic.

use std::collections::HashMap;
use std::sync::Arc;

use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info};

use crate::db::catalog::{self, HeuristicRow, SubprincipleRow};
use crate::db::{access, heuristic_responses, questions, users, SurveyDb};
use crate::error::StorageError;
use crate::views::{
    EvaluatorView, FinalizeResultView, HeuristicDraftView, HeuristicEvaluatorReportView,
    HeuristicFinalizeView, HeuristicQuestionReportView, HeuristicQuestionView, HeuristicReportView,
    HeuristicResponsesReportView, QuestionSummaryView, SubprincipleReportView,
};

use super::access_service::{require_access, require_writable};
use super::design_service::{require_test, ResponsePath};
use super::events::{EventBus, ResponseKind, SurveyEvent};

/// One heuristic's answers, resolved to row ids
#[derive(Debug)]
struct ResolvedHeuristic {
    question_id: i64,
    heuristic_id: i64,
    comment: Option<String>,
    /// (subprinciple id, score)
    scores: Vec<(i64, i64)>,
}

/// Heuristic response service
pub struct HeuristicResponseService {
    db: Arc<SurveyDb>,
    events: Arc<EventBus>,
}

impl HeuristicResponseService {
    /// Create a new heuristic response service
    pub fn new(db: Arc<SurveyDb>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    // =========================================================================
    // Drafts
    // =========================================================================

    /// Upsert draft scores and comments; returns the number of scores written
    pub fn save_partial(
        &self,
        test_id: i64,
        evaluator_id: i64,
        responses: &[HeuristicQuestionView],
    ) -> Result<usize, StorageError> {
        if responses.is_empty() {
            return Err(StorageError::InvalidInput("'responses' must not be empty".to_string()));
        }
        validate_groups(responses)?;

        let count = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            require_test(&tx, test_id, ResponsePath::Heuristic)?;
            require_writable(&tx, evaluator_id, test_id)?;

            let resolved = resolve_groups(&tx, test_id, responses)?;
            let count = write_groups(&tx, evaluator_id, test_id, &resolved, false)?;

            tx.commit()?;
            Ok(count)
        })?;

        info!(evaluator_id, test_id, count, "Heuristic draft saved");
        self.events.emit(SurveyEvent::DraftSaved {
            evaluator_id,
            test_id,
            kind: ResponseKind::Heuristic,
            count,
        });

        Ok(count)
    }

    /// Scores saved so far, one row per subprinciple
    pub fn get_partial(&self, test_id: i64, evaluator_id: i64) -> Result<Vec<HeuristicDraftView>, StorageError> {
        self.db.with_conn(|conn| {
            require_test(conn, test_id, ResponsePath::Heuristic)?;
            require_access(conn, evaluator_id, test_id)?;

            let rows = heuristic_responses::list_for_evaluator(conn, test_id, evaluator_id, false)?;
            Ok(rows
                .into_iter()
                .map(|row| HeuristicDraftView {
                    question_id: row.question_id,
                    heuristic_code: row.heuristic_code,
                    subprinciple_code: row.subprinciple_code,
                    response_value: row.score,
                    comment: row.comment,
                    complete: row.complete,
                })
                .collect())
        })
    }

    // =========================================================================
    // Finalization
    // =========================================================================

    /// Write the submitted scores as complete, complete every earlier draft
    /// and lock the access, all in one transaction
    pub fn finalize(&self, test_id: i64, request: &HeuristicFinalizeView) -> Result<FinalizeResultView, StorageError> {
        let evaluator_id = request.evaluator_id;
        validate_groups(&request.responses)?;

        let finalized = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            require_test(&tx, test_id, ResponsePath::Heuristic)?;
            require_writable(&tx, evaluator_id, test_id)?;
            let resolved = resolve_groups(&tx, test_id, &request.responses)?;

            if !access::lock_if_unlocked(&tx, evaluator_id, test_id)? {
                return Err(StorageError::Forbidden(format!(
                    "Access of evaluator {} to test {} is already locked",
                    evaluator_id, test_id
                )));
            }
            let written = write_groups(&tx, evaluator_id, test_id, &resolved, true)?;
            let drafts = heuristic_responses::complete_all(&tx, evaluator_id, test_id)?;

            tx.commit()?;
            Ok(written + drafts)
        })?;

        info!(evaluator_id, test_id, count = finalized, path = "heuristic", "Responses finalized");
        self.events.emit(SurveyEvent::ResponsesFinalized {
            evaluator_id,
            test_id,
            kind: ResponseKind::Heuristic,
            count: finalized,
        });

        Ok(FinalizeResultView {
            test_id,
            evaluator_id,
            locked: true,
            finalized,
        })
    }

    /// Complete scores of every locked evaluator
    ///
    /// Every question lists every linked heuristic with all of its
    /// subprinciples; unanswered entries carry null values.
    pub fn finalize_report(&self, test_id: i64) -> Result<HeuristicResponsesReportView, StorageError> {
        self.db.with_conn(|conn| {
            let test = require_test(conn, test_id, ResponsePath::Heuristic)?;
            let layout = question_layout(conn, test_id)?;
            let evaluator_ids = access::locked_evaluators(conn, test_id)?;
            debug!(test_id, evaluators = evaluator_ids.len(), "Building heuristic report");

            let mut evaluators = Vec::with_capacity(evaluator_ids.len());
            for evaluator_id in evaluator_ids {
                let user = users::get_user(conn, evaluator_id)?
                    .ok_or_else(|| StorageError::Internal(format!("Access for unknown user {}", evaluator_id)))?;

                let mut scores: HashMap<(i64, String), i64> = HashMap::new();
                let mut comments: HashMap<(i64, String), String> = HashMap::new();
                for row in heuristic_responses::list_for_evaluator(conn, test_id, evaluator_id, true)? {
                    if let Some(comment) = row.comment {
                        comments.insert((row.question_id, row.heuristic_code.clone()), comment);
                    }
                    scores.insert((row.question_id, row.subprinciple_code), row.score);
                }

                let questions = layout
                    .iter()
                    .map(|(question, heuristics)| HeuristicQuestionReportView {
                        question: question.clone(),
                        heuristics: heuristics
                            .iter()
                            .map(|(heuristic, subprinciples)| HeuristicReportView {
                                heuristic_code: heuristic.code.clone(),
                                title: heuristic.title.clone(),
                                comment: comments
                                    .get(&(question.question_id, heuristic.code.clone()))
                                    .cloned(),
                                subprinciples: subprinciples
                                    .iter()
                                    .map(|s| SubprincipleReportView {
                                        subprinciple_code: s.code.clone(),
                                        subtitle: s.subtitle.clone(),
                                        response_value: scores
                                            .get(&(question.question_id, s.code.clone()))
                                            .copied(),
                                    })
                                    .collect(),
                            })
                            .collect(),
                    })
                    .collect();

                evaluators.push(HeuristicEvaluatorReportView {
                    evaluator: EvaluatorView::from(user),
                    questions,
                });
            }

            Ok(HeuristicResponsesReportView { test, evaluators })
        })
    }
}

type QuestionLayout = Vec<(QuestionSummaryView, Vec<(HeuristicRow, Vec<SubprincipleRow>)>)>;

/// Questions of a test with their linked heuristics and subprinciples
fn question_layout(conn: &Connection, test_id: i64) -> Result<QuestionLayout, StorageError> {
    let mut subprinciples_by_heuristic: HashMap<i64, Vec<SubprincipleRow>> = HashMap::new();
    let mut layout = Vec::new();

    for question in questions::list_questions(conn, test_id)? {
        let mut heuristics = Vec::new();
        for heuristic in questions::question_heuristics(conn, question.id)? {
            let subprinciples = match subprinciples_by_heuristic.get(&heuristic.id) {
                Some(cached) => cached.clone(),
                None => {
                    let loaded = catalog::list_subprinciples(conn, heuristic.id)?;
                    subprinciples_by_heuristic.insert(heuristic.id, loaded.clone());
                    loaded
                }
            };
            heuristics.push((heuristic, subprinciples));
        }
        layout.push((QuestionSummaryView::from(&question), heuristics));
    }

    Ok(layout)
}

fn validate_groups(responses: &[HeuristicQuestionView]) -> Result<(), StorageError> {
    responses.iter().try_for_each(HeuristicQuestionView::validate)
}

/// Resolve codes to ids and check that every score belongs where it claims
fn resolve_groups(
    conn: &Connection,
    test_id: i64,
    responses: &[HeuristicQuestionView],
) -> Result<Vec<ResolvedHeuristic>, StorageError> {
    let mut resolved = Vec::new();

    for group in responses {
        let question = questions::get_question(conn, test_id, group.question_id)?.ok_or_else(|| {
            StorageError::NotFound(format!(
                "Question {} not found in test {}",
                group.question_id, test_id
            ))
        })?;

        for answer in &group.heuristics {
            let heuristic = catalog::get_heuristic_by_code(conn, &answer.heuristic_code)?.ok_or_else(|| {
                StorageError::NotFound(format!("Heuristic {} not found", answer.heuristic_code))
            })?;
            if !question.heuristics.contains(&heuristic.code) {
                return Err(StorageError::InvalidInput(format!(
                    "Heuristic {} is not linked to question {}",
                    heuristic.code, question.id
                )));
            }

            let mut scores = Vec::with_capacity(answer.subprinciples.len());
            for score in &answer.subprinciples {
                let subprinciple = catalog::get_subprinciple_by_code(conn, &score.subprinciple_code)?
                    .ok_or_else(|| {
                        StorageError::NotFound(format!("Subprinciple {} not found", score.subprinciple_code))
                    })?;
                if subprinciple.heuristic_id != heuristic.id {
                    return Err(StorageError::InvalidInput(format!(
                        "Subprinciple {} does not belong to heuristic {}",
                        subprinciple.code, heuristic.code
                    )));
                }
                scores.push((subprinciple.id, score.response_value));
            }

            resolved.push(ResolvedHeuristic {
                question_id: question.id,
                heuristic_id: heuristic.id,
                comment: answer.comment.clone(),
                scores,
            });
        }
    }

    Ok(resolved)
}

fn write_groups(
    conn: &Connection,
    evaluator_id: i64,
    test_id: i64,
    resolved: &[ResolvedHeuristic],
    complete: bool,
) -> Result<usize, StorageError> {
    let mut written = 0;
    for group in resolved {
        for (subprinciple_id, score) in &group.scores {
            heuristic_responses::upsert_score(
                conn,
                evaluator_id,
                test_id,
                group.question_id,
                *subprinciple_id,
                *score,
                complete,
            )?;
            written += 1;
        }
        if let Some(comment) = &group.comment {
            heuristic_responses::upsert_comment(conn, evaluator_id, test_id, group.question_id, group.heuristic_id, comment)?;
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::questions::QuestionInput;
    use crate::db::test_support;
    use crate::views::{HeuristicAnswerView, SubprincipleScoreView};

    struct Fixture {
        service: HeuristicResponseService,
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
                let t = test_support::design_test(conn, "HEUR000001", true);
                let h1 = test_support::heuristic(conn, "H01M", &["H01M01", "H01M02"]);
                let h2 = test_support::heuristic(conn, "H02M", &["H02M01"]);
                test_support::heuristic(conn, "H03M", &["H03M01"]);
                let q = questions::create_question(
                    conn,
                    t,
                    &QuestionInput {
                        title: "Q2".into(),
                        description: String::new(),
                        url_frame: String::new(),
                        response_type: None,
                        heuristic_ids: vec![h1, h2],
                    },
                )?;
                access::insert_unlocked(conn, e, t)?;
                Ok((e, t, q.id))
            })
            .unwrap();
        Fixture {
            service: HeuristicResponseService::new(db.clone(), Arc::new(EventBus::new())),
            db,
            evaluator,
            test,
            question,
        }
    }

    fn group(question_id: i64, heuristic: &str, comment: Option<&str>, scores: &[(&str, i64)]) -> HeuristicQuestionView {
        HeuristicQuestionView {
            question_id,
            heuristics: vec![HeuristicAnswerView {
                heuristic_code: heuristic.to_string(),
                comment: comment.map(str::to_string),
                subprinciples: scores
                    .iter()
                    .map(|(code, value)| SubprincipleScoreView {
                        subprinciple_code: code.to_string(),
                        response_value: *value,
                    })
                    .collect(),
            }],
        }
    }

    #[test]
    fn test_partial_scores_share_one_comment() {
        let f = fixture();
        let count = f
            .service
            .save_partial(
                f.test,
                f.evaluator,
                &[group(f.question, "H01M", Some("clear"), &[("H01M01", 5), ("H01M02", 2)])],
            )
            .unwrap();
        assert_eq!(count, 2);

        let drafts = f.service.get_partial(f.test, f.evaluator).unwrap();
        assert_eq!(drafts.len(), 2);
        assert!(drafts.iter().all(|d| d.heuristic_code == "H01M"));
        assert!(drafts.iter().all(|d| d.comment.as_deref() == Some("clear")));
    }

    #[test]
    fn test_rejects_unknown_and_misplaced_codes() {
        let f = fixture();
        let save = |g: HeuristicQuestionView| f.service.save_partial(f.test, f.evaluator, &[g]);

        assert!(matches!(
            save(group(f.question, "H01M", None, &[("H01M99", 1)])),
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            save(group(f.question, "H01M", None, &[("H02M01", 1)])),
            Err(StorageError::InvalidInput(_))
        ));
        assert!(matches!(
            save(group(f.question, "H03M", None, &[("H03M01", 1)])),
            Err(StorageError::InvalidInput(_))
        ));
        assert!(matches!(
            save(group(f.question, "H99M", None, &[("H01M01", 1)])),
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            save(group(f.question + 50, "H01M", None, &[("H01M01", 1)])),
            Err(StorageError::NotFound(_))
        ));
        assert_eq!(f.db.stats().unwrap().heuristic_response_count, 0);
    }

    #[test]
    fn test_report_pads_unanswered_entries() {
        let f = fixture();
        f.service
            .save_partial(f.test, f.evaluator, &[group(f.question, "H01M", Some("ok"), &[("H01M01", 5)])])
            .unwrap();
        f.service
            .finalize(
                f.test,
                &HeuristicFinalizeView {
                    evaluator_id: f.evaluator,
                    responses: vec![],
                },
            )
            .unwrap();

        let report = f.service.finalize_report(f.test).unwrap();
        assert_eq!(report.evaluators.len(), 1);
        let question = &report.evaluators[0].questions[0];
        assert_eq!(question.heuristics.len(), 2);

        let h01 = &question.heuristics[0];
        assert_eq!(h01.heuristic_code, "H01M");
        assert_eq!(h01.comment.as_deref(), Some("ok"));
        assert_eq!(h01.subprinciples[0].response_value, Some(5));
        assert_eq!(h01.subprinciples[1].response_value, None);

        let h02 = &question.heuristics[1];
        assert_eq!(h02.comment, None);
        assert_eq!(h02.subprinciples[0].response_value, None);
    }

    #[test]
    fn test_finalize_twice_is_forbidden() {
        let f = fixture();
        let request = HeuristicFinalizeView {
            evaluator_id: f.evaluator,
            responses: vec![group(f.question, "H02M", None, &[("H02M01", 3)])],
        };
        assert_eq!(f.service.finalize(f.test, &request).unwrap().finalized, 1);
        assert!(matches!(f.service.finalize(f.test, &request), Err(StorageError::Forbidden(_))));
    }
}
