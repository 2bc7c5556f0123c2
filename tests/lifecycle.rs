//! Access and response lifecycle through the service layer

use std::sync::Arc;

use usability_store::db::design_tests::TestType;
use usability_store::db::questions::ResponseType;
use usability_store::db::users::Role;
use usability_store::services::{ResponseKind, SurveyEvent};
use usability_store::views::{
    CreateDesignTestView, CreateUserView, QuestionInputView, StandardAnswerView, StandardFinalizeView,
};
use usability_store::{CatalogDefinition, Config, Services, StorageError, SurveyDb};

struct Study {
    services: Arc<Services>,
    evaluator: i64,
    test: i64,
    question: i64,
}

fn study(db: Arc<SurveyDb>) -> Study {
    let services = Arc::new(Services::new(db, &Config::default()));

    let evaluator = services
        .design
        .create_user(&CreateUserView {
            username: "e1".into(),
            email: "e1@example.com".into(),
            role: Role::Evaluator,
            experience: None,
        })
        .unwrap()
        .id;

    let test = services
        .design
        .create_test(&CreateDesignTestView {
            owner_id: None,
            owner_name: None,
            name: "T1".into(),
            url: "https://example.com/prototype".into(),
            description: None,
            test_type: TestType::Tablet,
            has_heuristics: false,
            code: Some("ABCDEF1234".into()),
        })
        .unwrap()
        .id;

    let question = services
        .design
        .create_question(
            test,
            &QuestionInputView {
                title: "Q1".into(),
                description: String::new(),
                url_frame: String::new(),
                response_type: Some(ResponseType::Rating),
                heuristics: vec![],
            },
        )
        .unwrap()
        .id;

    Study {
        services,
        evaluator,
        test,
        question,
    }
}

fn in_memory() -> Study {
    study(Arc::new(SurveyDb::open_in_memory().unwrap()))
}

fn answer(question_id: i64, value: i64) -> StandardAnswerView {
    StandardAnswerView {
        question_id,
        response_value: value,
        comment: Some("fine".into()),
    }
}

#[test]
fn redeem_twice_yields_one_unlocked_record() {
    let s = in_memory();
    let first = s.services.access.grant_or_unlock(s.evaluator, "ABCDEF1234").unwrap();
    let second = s.services.access.grant_or_unlock(s.evaluator, "ABCDEF1234").unwrap();

    assert!(!first.access.locked && !second.access.locked);
    assert!(first.created && !second.created);
    assert_eq!(s.services.db.stats().unwrap().access_count, 1);
}

#[test]
fn finalize_emits_events_and_locks() {
    let s = in_memory();
    let mut rx = s.services.events.subscribe();

    s.services.access.grant_or_unlock(s.evaluator, "ABCDEF1234").unwrap();
    s.services
        .standard
        .save_partial(s.test, s.evaluator, &[answer(s.question, 4)])
        .unwrap();
    s.services
        .standard
        .finalize(
            s.test,
            &StandardFinalizeView {
                evaluator_id: s.evaluator,
                responses: vec![answer(s.question, 4)],
            },
        )
        .unwrap();

    let events: Vec<SurveyEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert_eq!(
        events,
        vec![
            SurveyEvent::AccessGranted { evaluator_id: s.evaluator, test_id: s.test },
            SurveyEvent::DraftSaved {
                evaluator_id: s.evaluator,
                test_id: s.test,
                kind: ResponseKind::Standard,
                count: 1,
            },
            SurveyEvent::ResponsesFinalized {
                evaluator_id: s.evaluator,
                test_id: s.test,
                kind: ResponseKind::Standard,
                count: 1,
            },
        ]
    );

    let visible = s.services.access.list_accessible(s.evaluator).unwrap();
    assert!(visible[0].access.locked);
    assert!(visible[0].is_complete);
}

#[test]
fn redeem_after_finalize_reopens_for_drafts() {
    let s = in_memory();
    s.services.access.grant_or_unlock(s.evaluator, "ABCDEF1234").unwrap();
    s.services
        .standard
        .finalize(
            s.test,
            &StandardFinalizeView {
                evaluator_id: s.evaluator,
                responses: vec![answer(s.question, 2)],
            },
        )
        .unwrap();

    assert!(matches!(
        s.services.standard.save_partial(s.test, s.evaluator, &[answer(s.question, 3)]),
        Err(StorageError::Forbidden(_))
    ));

    let reopened = s.services.access.grant_or_unlock(s.evaluator, "ABCDEF1234").unwrap();
    assert!(!reopened.access.locked);
    s.services
        .standard
        .save_partial(s.test, s.evaluator, &[answer(s.question, 3)])
        .unwrap();

    // Unlocked evaluators are not reported
    let report = s.services.standard.finalize_report(s.test).unwrap();
    assert!(report.evaluators.is_empty());
}

#[test]
fn report_pads_unanswered_questions() {
    let s = in_memory();
    let second = s
        .services
        .design
        .create_question(
            s.test,
            &QuestionInputView {
                title: "Q2".into(),
                description: String::new(),
                url_frame: String::new(),
                response_type: Some(ResponseType::Coherence),
                heuristics: vec![],
            },
        )
        .unwrap();

    s.services.access.grant_or_unlock(s.evaluator, "ABCDEF1234").unwrap();
    s.services
        .standard
        .finalize(
            s.test,
            &StandardFinalizeView {
                evaluator_id: s.evaluator,
                responses: vec![answer(s.question, 5)],
            },
        )
        .unwrap();

    let report = s.services.standard.finalize_report(s.test).unwrap();
    let responses = &report.evaluators[0].responses;
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].response.as_ref().unwrap().response_value, 5);
    assert_eq!(responses[1].question.question_id, second.id);
    assert!(responses[1].response.is_none());
}

#[test]
fn concurrent_finalize_locks_once() {
    let s = in_memory();
    s.services.access.grant_or_unlock(s.evaluator, "ABCDEF1234").unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let services = s.services.clone();
            let (test, evaluator, question) = (s.test, s.evaluator, s.question);
            std::thread::spawn(move || {
                services.standard.finalize(
                    test,
                    &StandardFinalizeView {
                        evaluator_id: evaluator,
                        responses: vec![answer(question, i)],
                    },
                )
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, StorageError::Forbidden(_))));
}

#[test]
fn seeded_file_database_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("survey.db");

    {
        let s = study(Arc::new(SurveyDb::open(&path).unwrap()));
        let report = s
            .services
            .seed_catalog(&CatalogDefinition::builtin().unwrap())
            .unwrap();
        assert_eq!(report.heuristics, 12);
        s.services.access.grant_or_unlock(s.evaluator, "ABCDEF1234").unwrap();
        s.services
            .standard
            .save_partial(s.test, s.evaluator, &[answer(s.question, 1)])
            .unwrap();
    }

    let db = Arc::new(SurveyDb::open(&path).unwrap());
    let stats = db.stats().unwrap();
    assert_eq!(stats.heuristic_count, 12);
    assert_eq!(stats.subprinciple_count, 71);
    assert_eq!(stats.standard_response_count, 1);
    assert_eq!(stats.access_count, 1);
}
