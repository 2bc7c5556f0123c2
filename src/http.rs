//! HTTP API for the evaluation lifecycle
//!
//! ## Catalog and authoring
//! - `GET /health` - Status and row counts
//! - `GET /heuristics` - Heuristic catalog with subprinciples
//! - `POST /users`, `GET /users/{id}`
//! - `POST /designtests`, `GET /designtests/{id}`
//! - `GET /designtests/code/{code}/available`
//! - `GET /designtests/{id}/heuristics`
//! - `GET|POST /designtests/{id}/questions`
//! - `GET|PUT /designtests/{id}/questions/{question_id}`
//!
//! ## Access gate
//! - `POST /designtests/access/{evaluator_id}` - Redeem `{code}` (201 created, 200 otherwise)
//! - `GET /designtests/access/{evaluator_id}` - Visible tests of an evaluator
//! - `POST /designtests/access/{test_id}/hide` and `/show` - Body `{evaluator_id}`
//!
//! ## Responses
//! - `GET|POST /designtests/{test_id}/standard-responses/{evaluator_id}` - Draft read / save
//! - `GET /designtests/{test_id}/standard-responses/finalize` - Report of locked evaluators
//! - `POST /designtests/{test_id}/standard-responses/finalize` - Finalize `{evaluator_id, responses}`
//! - The same four under `heuristic-responses`
//!
//! ## Example Usage
//!
//! ```bash
//! # Redeem a code
//! curl -X POST -d '{"code": "ABCDEF1234"}' http://localhost:8095/designtests/access/7
//!
//! # Save a draft answer
//! curl -X POST -d '{"responses": [{"question_id": 3, "response_value": 4}]}' \
//!      http://localhost:8095/designtests/1/standard-responses/7
//!
//! # Finalize
//! curl -X POST -d '{"evaluator_id": 7, "responses": []}' \
//!      http://localhost:8095/designtests/1/standard-responses/finalize
//! ```

use crate::config::Config;
use crate::error::StorageError;
use crate::services::{self, HandlerResult, Services};
use crate::views::{
    AccessSummaryView, AccessView, CodeAvailabilityView, CreateDesignTestView, CreateUserView,
    HeuristicDraftInputView, HeuristicFinalizeView, QuestionInputView, RedeemCodeView,
    SaveResultView, StandardDraftInputView, StandardFinalizeView, TestHeuristicsFlagView,
    VisibilityView,
};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// HTTP server state
pub struct HttpServer {
    services: Arc<Services>,
    bind_addr: SocketAddr,
    max_body_bytes: usize,
    expose_internal_errors: bool,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(services: Arc<Services>, config: &Config) -> Self {
        Self {
            services,
            bind_addr: config.http_addr(),
            max_body_bytes: config.max_body_bytes,
            expose_internal_errors: config.expose_internal_errors,
        }
    }

    /// Run the HTTP server
    pub async fn run(self: Arc<Self>) -> Result<(), StorageError> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "HTTP server listening");

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_request(req).await }
                });

                if let Err(err) = http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    warn!(addr = %remote_addr, error = %err, "Connection error");
                }
            });
        }
    }

    /// Read the body and hand the request to the router
    async fn handle_request(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, hyper::Error> {
        let path = req.uri().path().to_string();
        let method = req.method().clone();

        let body = match Limited::new(req.into_body(), self.max_body_bytes).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let error = if e.downcast_ref::<LengthLimitError>().is_some() {
                    StorageError::Parse(format!("Request body exceeds {} bytes", self.max_body_bytes))
                } else {
                    StorageError::Internal(format!("Failed to read body: {}", e))
                };
                return Ok(services::error_response(error, self.expose_internal_errors));
            }
        };

        Ok(self.dispatch(method, &path, body).await)
    }

    /// Route a request with an already read body
    ///
    /// Socket-free entry point, used by `handle_request` and by tests.
    pub async fn dispatch(&self, method: Method, path: &str, body: Bytes) -> Response<Full<Bytes>> {
        debug!(method = %method, path = %path, "Incoming request");

        match self.route(method, path, &body) {
            Ok(response) => response,
            Err(e) => services::error_response(e, self.expose_internal_errors),
        }
    }

    fn route(&self, method: Method, path: &str, body: &Bytes) -> HandlerResult {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        match (method, segments.as_slice()) {
            // Health and catalog
            (Method::GET, ["health"]) => self.handle_health(),
            (Method::GET, ["heuristics"]) => Ok(services::ok(&self.services.design.list_catalog()?)),

            // Users
            (Method::POST, ["users"]) => {
                let view: CreateUserView = parse_body(body)?;
                Ok(services::created(&self.services.design.create_user(&view)?))
            }
            (Method::GET, ["users", id]) => {
                let id = parse_id(id, "user id")?;
                match self.services.design.get_user(id)? {
                    Some(user) => Ok(services::ok(&user)),
                    None => Ok(services::not_found(&format!("User {} not found", id))),
                }
            }

            // Design tests
            (Method::POST, ["designtests"]) => {
                let view: CreateDesignTestView = parse_body(body)?;
                Ok(services::created(&self.services.design.create_test(&view)?))
            }
            (Method::GET, ["designtests", "code", code, "available"]) => {
                let available = self.services.design.code_available(code)?;
                Ok(services::ok(&CodeAvailabilityView {
                    code: code.to_string(),
                    available,
                }))
            }

            // Access gate
            (Method::POST, ["designtests", "access", test_id, "hide"]) => {
                self.handle_visibility(test_id, body, true)
            }
            (Method::POST, ["designtests", "access", test_id, "show"]) => {
                self.handle_visibility(test_id, body, false)
            }
            (Method::POST, ["designtests", "access", evaluator_id]) => {
                let evaluator_id = parse_id(evaluator_id, "evaluator id")?;
                let view: RedeemCodeView = parse_body(body)?;
                let redemption = self.services.access.grant_or_unlock(evaluator_id, &view.code)?;
                let access = AccessView::from(redemption.access);
                if redemption.created {
                    Ok(services::created(&access))
                } else {
                    Ok(services::ok(&access))
                }
            }
            (Method::GET, ["designtests", "access", evaluator_id]) => {
                let evaluator_id = parse_id(evaluator_id, "evaluator id")?;
                let tests: Vec<AccessSummaryView> = self
                    .services
                    .access
                    .list_accessible(evaluator_id)?
                    .into_iter()
                    .map(AccessSummaryView::from)
                    .collect();
                Ok(services::ok(&tests))
            }

            (Method::GET, ["designtests", id]) => {
                let id = parse_id(id, "test id")?;
                match self.services.design.get_test(id)? {
                    Some(test) => Ok(services::ok(&test)),
                    None => Ok(services::not_found(&format!("Design test {} not found", id))),
                }
            }
            (Method::GET, ["designtests", id, "heuristics"]) => {
                let id = parse_id(id, "test id")?;
                match self.services.design.get_test(id)? {
                    Some(test) => Ok(services::ok(&TestHeuristicsFlagView {
                        test_id: test.id,
                        has_heuristics: test.has_heuristics,
                    })),
                    None => Ok(services::not_found(&format!("Design test {} not found", id))),
                }
            }

            // Questions
            (Method::GET, ["designtests", id, "questions"]) => {
                let id = parse_id(id, "test id")?;
                Ok(services::ok(&self.services.design.list_questions(id)?))
            }
            (Method::POST, ["designtests", id, "questions"]) => {
                let id = parse_id(id, "test id")?;
                let view: QuestionInputView = parse_body(body)?;
                Ok(services::created(&self.services.design.create_question(id, &view)?))
            }
            (Method::GET, ["designtests", id, "questions", question_id]) => {
                let id = parse_id(id, "test id")?;
                let question_id = parse_id(question_id, "question id")?;
                Ok(services::ok(&self.services.design.get_question(id, question_id)?))
            }
            (Method::PUT, ["designtests", id, "questions", question_id]) => {
                let id = parse_id(id, "test id")?;
                let question_id = parse_id(question_id, "question id")?;
                let view: QuestionInputView = parse_body(body)?;
                Ok(services::ok(&self.services.design.update_question(id, question_id, &view)?))
            }

            // Standard responses
            (Method::GET, ["designtests", test_id, "standard-responses", "finalize"]) => {
                let test_id = parse_id(test_id, "test id")?;
                Ok(services::ok(&self.services.standard.finalize_report(test_id)?))
            }
            (Method::POST, ["designtests", test_id, "standard-responses", "finalize"]) => {
                let test_id = parse_id(test_id, "test id")?;
                let view: StandardFinalizeView = parse_body(body)?;
                Ok(services::ok(&self.services.standard.finalize(test_id, &view)?))
            }
            (Method::GET, ["designtests", test_id, "standard-responses", evaluator_id]) => {
                let test_id = parse_id(test_id, "test id")?;
                let evaluator_id = parse_id(evaluator_id, "evaluator id")?;
                Ok(services::ok(&self.services.standard.get_partial(test_id, evaluator_id)?))
            }
            (Method::POST, ["designtests", test_id, "standard-responses", evaluator_id]) => {
                let test_id = parse_id(test_id, "test id")?;
                let evaluator_id = parse_id(evaluator_id, "evaluator id")?;
                let view: StandardDraftInputView = parse_body(body)?;
                let saved = self.services.standard.save_partial(test_id, evaluator_id, &view.responses)?;
                Ok(services::created(&SaveResultView { test_id, evaluator_id, saved }))
            }

            // Heuristic responses
            (Method::GET, ["designtests", test_id, "heuristic-responses", "finalize"]) => {
                let test_id = parse_id(test_id, "test id")?;
                Ok(services::ok(&self.services.heuristic.finalize_report(test_id)?))
            }
            (Method::POST, ["designtests", test_id, "heuristic-responses", "finalize"]) => {
                let test_id = parse_id(test_id, "test id")?;
                let view: HeuristicFinalizeView = parse_body(body)?;
                Ok(services::ok(&self.services.heuristic.finalize(test_id, &view)?))
            }
            (Method::GET, ["designtests", test_id, "heuristic-responses", evaluator_id]) => {
                let test_id = parse_id(test_id, "test id")?;
                let evaluator_id = parse_id(evaluator_id, "evaluator id")?;
                Ok(services::ok(&self.services.heuristic.get_partial(test_id, evaluator_id)?))
            }
            (Method::POST, ["designtests", test_id, "heuristic-responses", evaluator_id]) => {
                let test_id = parse_id(test_id, "test id")?;
                let evaluator_id = parse_id(evaluator_id, "evaluator id")?;
                let view: HeuristicDraftInputView = parse_body(body)?;
                let saved = self.services.heuristic.save_partial(test_id, evaluator_id, &view.responses)?;
                Ok(services::created(&SaveResultView { test_id, evaluator_id, saved }))
            }

            (_, segments) if is_known_route(segments) => Ok(services::method_not_allowed()),
            _ => Ok(services::not_found("Not found")),
        }
    }

    /// Health check endpoint
    fn handle_health(&self) -> HandlerResult {
        let stats = self.services.db.stats()?;
        Ok(services::ok(&serde_json::json!({
            "status": "ok",
            "stats": stats,
        })))
    }

    /// POST /designtests/access/{test_id}/hide|show
    fn handle_visibility(&self, test_id: &str, body: &Bytes, hidden: bool) -> HandlerResult {
        let test_id = parse_id(test_id, "test id")?;
        let view: VisibilityView = parse_body(body)?;
        let access = self.services.access.set_hidden(test_id, view.evaluator_id, hidden)?;
        Ok(services::ok(&AccessView::from(access)))
    }
}

/// Paths served for some method, used to tell 405 from 404
fn is_known_route(segments: &[&str]) -> bool {
    matches!(
        segments,
        ["health"]
            | ["heuristics"]
            | ["users"]
            | ["users", _]
            | ["designtests"]
            | ["designtests", _]
            | ["designtests", "code", _, "available"]
            | ["designtests", "access", _, "hide" | "show"]
            | ["designtests", _, "heuristics" | "questions"]
            | ["designtests", _, "questions", _]
            | ["designtests", _, "standard-responses" | "heuristic-responses", _]
    )
}

fn parse_id(value: &str, what: &str) -> Result<i64, StorageError> {
    value
        .parse()
        .map_err(|_| StorageError::Parse(format!("Invalid {}: {}", what, value)))
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, StorageError> {
    if body.is_empty() {
        return Err(StorageError::Parse("Request body is required".to_string()));
    }
    Ok(serde_json::from_slice(body)?)
}
