//! HTTP response building helpers
//!
//! Every handler answers with JSON. Errors carry a message and a stable code.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::Serialize;

use crate::error::TraceError;

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

fn error_body(status: StatusCode, message: &str, code: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": message, "code": code }))
}

/// Build a 404 Not Found response with message
pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    error_body(StatusCode::NOT_FOUND, message, "not_found")
}

/// Build a 400 Bad Request response with message
pub fn bad_request(message: &str) -> Response<Full<Bytes>> {
    error_body(StatusCode::BAD_REQUEST, message, "invalid_argument")
}

/// Status code for a trace error
pub fn status_for(error: &TraceError) -> StatusCode {
    match error {
        TraceError::NotFound(_) => StatusCode::NOT_FOUND,
        TraceError::InvalidArgument(_) | TraceError::Json(_) => StatusCode::BAD_REQUEST,
        TraceError::ResourceExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        TraceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a TraceError to an appropriate HTTP response
pub fn error_response(error: TraceError) -> Response<Full<Bytes>> {
    error_body(status_for(&error), &error.to_string(), error.code())
}

/// Wrap a service result into an HTTP response
pub fn from_result<T: Serialize>(result: Result<T, TraceError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => ok(&value),
        Err(e) => error_response(e),
    }
}
