//! RFC 9457 problem-details error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

fn problem(status: StatusCode, detail: String) -> Response {
    let body = json!({
        "type": "about:blank",
        "title": status.canonical_reason().unwrap_or("error"),
        "status": status.as_u16(),
        "detail": detail,
    });
    (status, Json(body)).into_response()
}

pub fn bad_request(detail: impl Into<String>) -> Response {
    problem(StatusCode::BAD_REQUEST, detail.into())
}

pub fn internal_error(detail: impl Into<String>) -> Response {
    problem(StatusCode::INTERNAL_SERVER_ERROR, detail.into())
}
