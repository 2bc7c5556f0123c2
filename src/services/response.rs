//! HTTP response building helpers
//!
//! Every handler returns through these so status codes and error bodies stay
//! uniform: `{"error": "..."}` for failures, the serialized value otherwise.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::Serialize;
use tracing::{error, warn};

use crate::error::StorageError;

/// Message sent instead of the real cause of a 500
pub const GENERIC_INTERNAL_ERROR: &str = "Internal server error";

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

/// Build a JSON response with 200 OK status
pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

/// Build a JSON response with 201 Created status
pub fn created<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::CREATED, body)
}

/// Build a 404 Not Found response with message
pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    json_response(StatusCode::NOT_FOUND, &serde_json::json!({ "error": message }))
}

/// Build a 400 Bad Request response with message
pub fn bad_request(message: &str) -> Response<Full<Bytes>> {
    json_response(StatusCode::BAD_REQUEST, &serde_json::json!({ "error": message }))
}

/// Build a 405 Method Not Allowed response
pub fn method_not_allowed() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({ "error": "Method not allowed" }),
    )
}

/// HTTP status for an error
pub fn status_for(error: &StorageError) -> StatusCode {
    match error {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::Forbidden(_) => StatusCode::FORBIDDEN,
        StorageError::InvalidInput(_) | StorageError::Parse(_) | StorageError::Json(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a StorageError to an appropriate HTTP response
///
/// Server-side failures are logged in full; the client only sees the cause
/// when `expose_internal` is set.
pub fn error_response(error: StorageError, expose_internal: bool) -> Response<Full<Bytes>> {
    let status = status_for(&error);

    let message = match status {
        StatusCode::FORBIDDEN => {
            warn!(error = %error, "Request rejected");
            error.to_string()
        }
        StatusCode::INTERNAL_SERVER_ERROR => {
            error!(error = %error, "Request failed");
            if expose_internal {
                error.to_string()
            } else {
                GENERIC_INTERNAL_ERROR.to_string()
            }
        }
        _ => error.to_string(),
    };

    json_response(status, &serde_json::json!({ "error": message }))
}

/// Result type alias for handlers
pub type HandlerResult = Result<Response<Full<Bytes>>, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&StorageError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&StorageError::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(status_for(&StorageError::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&StorageError::Parse("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&StorageError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_internal_error_text_is_hidden() {
        let response = error_response(StorageError::Internal("disk on fire".into()), false);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], GENERIC_INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn test_internal_error_text_can_be_exposed() {
        let response = error_response(StorageError::Internal("disk on fire".into()), true);
        assert_eq!(body_json(response).await["error"], "Internal error: disk on fire");
    }

    #[tokio::test]
    async fn test_client_error_keeps_message() {
        let response = error_response(StorageError::Forbidden("Access is locked".into()), false);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"], "Access is locked");
    }
}
