//! End-to-end flows through the HTTP router

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::{Method, StatusCode};
use serde_json::{json, Value};

use usability_store::{CatalogDefinition, Config, HttpServer, Services, SurveyDb};

struct Api {
    server: HttpServer,
}

impl Api {
    fn new() -> Self {
        let config = Config::default();
        let db = Arc::new(SurveyDb::open_in_memory().unwrap());
        let services = Arc::new(Services::new(db, &config));
        services.seed_catalog(&CatalogDefinition::builtin().unwrap()).unwrap();
        Self {
            server: HttpServer::new(services, &config),
        }
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = body.map(|b| Bytes::from(b.to_string())).unwrap_or_default();
        let response = self.server.dispatch(method, path, body).await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.call(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, path, Some(body)).await
    }

    async fn evaluator(&self, name: &str) -> i64 {
        let (status, user) = self
            .post(
                "/users",
                json!({"username": name, "email": format!("{}@example.com", name), "role": "Evaluador"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        user["id"].as_i64().unwrap()
    }

    async fn design_test(&self, code: &str, has_heuristics: bool) -> i64 {
        let (status, test) = self
            .post(
                "/designtests",
                json!({
                    "name": format!("Test {}", code),
                    "url": "https://example.com/prototype",
                    "test_type": "Web",
                    "has_heuristics": has_heuristics,
                    "code": code,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", test);
        test["id"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn standard_scenario_redeem_save_finalize_lock() {
    let api = Api::new();
    let e1 = api.evaluator("e1").await;
    let t1 = api.design_test("ABCDEF1234", false).await;

    let (status, q1) = api
        .post(
            &format!("/designtests/{}/questions", t1),
            json!({"title": "Q1", "response_type": "Calificacion"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let q1 = q1["id"].as_i64().unwrap();

    // Redeem: created, then idempotent
    let (status, access) = api
        .post(&format!("/designtests/access/{}", e1), json!({"code": "ABCDEF1234"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(access["locked"], false);
    let (status, _) = api
        .post(&format!("/designtests/access/{}", e1), json!({"code": "ABCDEF1234"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    // Partial save
    let partial = format!("/designtests/{}/standard-responses/{}", t1, e1);
    let (status, _) = api
        .post(&partial, json!({"responses": [{"question_id": q1, "response_value": 4}]}))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, drafts) = api.get(&partial).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(drafts[0]["response_value"], 4);
    assert_eq!(drafts[0]["complete"], false);
    assert_eq!(drafts[0]["question"]["response_type"], "Calificacion");

    // Finalize, then the second finalize is rejected
    let finalize = format!("/designtests/{}/standard-responses/finalize", t1);
    let body = json!({"evaluator_id": e1, "responses": [{"question_id": q1, "response_value": 4}]});
    let (status, result) = api.post(&finalize, body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["locked"], true);

    let (status, error) = api.post(&finalize, body).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(error["error"].is_string());

    // Report and access list reflect completion
    let (status, report) = api.get(&finalize).await;
    assert_eq!(status, StatusCode::OK);
    let response = &report["evaluators"][0]["responses"][0]["response"];
    assert_eq!(response["response_value"], 4);

    let (_, tests) = api.get(&format!("/designtests/access/{}", e1)).await;
    assert_eq!(tests[0]["is_complete"], true);
    assert_eq!(tests[0]["locked"], true);
}

#[tokio::test]
async fn heuristic_scenario_report_is_padded() {
    let api = Api::new();
    let e1 = api.evaluator("e1").await;
    let t2 = api.design_test("HEURISTIC1", true).await;

    let (status, q2) = api
        .post(
            &format!("/designtests/{}/questions", t2),
            json!({"title": "Q2", "heuristics": ["H01M", "H02M"]}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let q2 = q2["id"].as_i64().unwrap();

    api.post(&format!("/designtests/access/{}", e1), json!({"code": "HEURISTIC1"}))
        .await;

    let group = json!([{
        "question_id": q2,
        "heuristics": [{
            "heuristic_code": "H01M",
            "comment": "Menu labels are clear",
            "subprinciples": [{"subprinciple_code": "H01M01", "response_value": 5}]
        }]
    }]);

    let partial = format!("/designtests/{}/heuristic-responses/{}", t2, e1);
    let (status, saved) = api.post(&partial, json!({"responses": group})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(saved["saved"], 1);

    let (_, drafts) = api.get(&partial).await;
    assert_eq!(drafts.as_array().unwrap().len(), 1);
    assert_eq!(drafts[0]["heuristic_code"], "H01M");
    assert_eq!(drafts[0]["subprinciple_code"], "H01M01");
    assert_eq!(drafts[0]["response_value"], 5);

    let finalize = format!("/designtests/{}/heuristic-responses/finalize", t2);
    let (status, _) = api
        .post(&finalize, json!({"evaluator_id": e1, "responses": group}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, report) = api.get(&finalize).await;
    assert_eq!(status, StatusCode::OK);
    let heuristics = &report["evaluators"][0]["questions"][0]["heuristics"];

    let h01 = &heuristics[0];
    assert_eq!(h01["heuristic_code"], "H01M");
    assert_eq!(h01["comment"], "Menu labels are clear");
    let answered: Vec<&Value> = h01["subprinciples"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|s| !s["response_value"].is_null())
        .collect();
    assert_eq!(answered.len(), 1);
    assert_eq!(answered[0]["subprinciple_code"], "H01M01");
    assert_eq!(answered[0]["response_value"], 5);

    // The sibling heuristic appears with null values
    let h02 = &heuristics[1];
    assert_eq!(h02["heuristic_code"], "H02M");
    assert!(h02["comment"].is_null());
    assert!(h02["subprinciples"]
        .as_array()
        .unwrap()
        .iter()
        .all(|s| s["response_value"].is_null()));
}

#[tokio::test]
async fn finalize_without_access_is_forbidden() {
    let api = Api::new();
    let e1 = api.evaluator("e1").await;
    let t1 = api.design_test("NOACCESS01", false).await;

    let (status, _) = api
        .post(
            &format!("/designtests/{}/standard-responses/finalize", t1),
            json!({"evaluator_id": e1, "responses": []}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = api
        .post(
            &format!("/designtests/{}/standard-responses/{}", t1, e1),
            json!({"responses": [{"question_id": 1, "response_value": 1}]}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn hide_and_show_do_not_touch_lock() {
    let api = Api::new();
    let e1 = api.evaluator("e1").await;
    let t1 = api.design_test("VISIBLE001", false).await;
    api.post(&format!("/designtests/access/{}", e1), json!({"code": "VISIBLE001"}))
        .await;

    let (status, access) = api
        .post(&format!("/designtests/access/{}/hide", t1), json!({"evaluator_id": e1}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(access["hidden"], true);
    assert_eq!(access["locked"], false);

    let (_, tests) = api.get(&format!("/designtests/access/{}", e1)).await;
    assert!(tests.as_array().unwrap().is_empty());

    let (_, access) = api
        .post(&format!("/designtests/access/{}/show", t1), json!({"evaluator_id": e1}))
        .await;
    assert_eq!(access["hidden"], false);
    assert_eq!(access["locked"], false);

    let (_, tests) = api.get(&format!("/designtests/access/{}", e1)).await;
    assert_eq!(tests.as_array().unwrap().len(), 1);

    let (status, _) = api
        .post(&format!("/designtests/access/{}/hide", t1), json!({"evaluator_id": e1 + 40}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn question_exclusivity_and_payload_errors() {
    let api = Api::new();
    let standard = api.design_test("STANDARD01", false).await;
    let heuristic = api.design_test("HEURIST001", true).await;

    let (status, _) = api
        .post(
            &format!("/designtests/{}/questions", heuristic),
            json!({"title": "Q", "response_type": "Legibilidad", "heuristics": ["H01M"]}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api
        .post(
            &format!("/designtests/{}/questions", standard),
            json!({"title": "Q", "response_type": "Legibilidad", "heuristics": ["H01M"]}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = api
        .post(
            &format!("/designtests/{}/questions", standard),
            json!({"title": "Q", "response_type": "Legibilidad", "weight": 2}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = api.get("/designtests/code/STANDARD01/available").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], false);

    let (status, body) = api.get(&format!("/designtests/{}/heuristics", heuristic)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_heuristics"], true);

    let (status, _) = api.get("/designtests/999/standard-responses/finalize").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn catalog_is_listed_with_subprinciples() {
    let api = Api::new();
    let (status, catalog) = api.get("/heuristics").await;
    assert_eq!(status, StatusCode::OK);
    let heuristics = catalog.as_array().unwrap();
    assert_eq!(heuristics.len(), 12);
    assert_eq!(heuristics[0]["code"], "H01M");
    assert_eq!(heuristics[0]["subprinciples"][0]["code"], "H01M01");
}
