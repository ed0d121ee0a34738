//! HTTP response building helpers
//!
//! Every handler builds its reply through these so error bodies share one
//! shape: `{"error": message}` plus `field` for validation failures.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::error::NexusError;

pub type Body = Full<Bytes>;

fn with_status(status: StatusCode, body: Bytes) -> Response<Body> {
    let mut resp = Response::new(Full::new(body));
    *resp.status_mut() = status;
    resp
}

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    let mut resp = with_status(status, Bytes::from(json));
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    resp
}

/// Build a JSON response with 200 OK status
pub fn ok<T: Serialize>(body: &T) -> Response<Body> {
    json_response(StatusCode::OK, body)
}

/// Build a JSON response with 201 Created status
pub fn created<T: Serialize>(body: &T) -> Response<Body> {
    json_response(StatusCode::CREATED, body)
}

/// Build a JSON response with 202 Accepted status
pub fn accepted<T: Serialize>(body: &T) -> Response<Body> {
    json_response(StatusCode::ACCEPTED, body)
}

/// Build an empty response with 204 No Content status
pub fn no_content() -> Response<Body> {
    with_status(StatusCode::NO_CONTENT, Bytes::new())
}

/// Convert a NexusError to an appropriate HTTP response
pub fn error_response(err: NexusError) -> Response<Body> {
    let status = err.status_code();
    let body = match &err {
        NexusError::Validation { field, message } => {
            serde_json::json!({ "error": message, "field": field })
        }
        NexusError::NotFound(msg)
        | NexusError::InvalidInput(msg)
        | NexusError::Unauthorized(msg)
        | NexusError::Forbidden(msg)
        | NexusError::Conflict(msg)
        | NexusError::Upstream(msg) => serde_json::json!({ "error": msg }),
        _ => {
            error!(error = %err, "Request failed");
            serde_json::json!({ "error": err.to_string() })
        }
    };
    json_response(status, &body)
}

/// File download with a UTF-8 filename
pub fn attachment(content_type: &'static str, filename: &str, body: Vec<u8>) -> Response<Body> {
    let mut resp = with_status(StatusCode::OK, Bytes::from(body));
    let headers = resp.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    let disposition = format!("attachment; filename*=UTF-8''{}", percent_encode(filename));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    resp
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// Add permissive CORS headers
pub fn with_cors(mut resp: Response<Body>) -> Response<Body> {
    let headers = resp.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, Content-Type"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("Content-Disposition"),
    );
    resp
}

/// Result type alias for handlers
pub type HandlerResult = Result<Response<Body>, NexusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_response() {
        let resp = ok(&serde_json::json!({"test": true}));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(error_response(NexusError::NotFound("x".into())).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            error_response(NexusError::field("priority", "must be P0, P1 or P2")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(error_response(NexusError::Forbidden("no".into())).status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_attachment_encodes_filename() {
        let resp = attachment("text/csv", "企业数据导出_1.csv", b"a,b".to_vec());
        let disposition = resp.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename*=UTF-8''%E4%BC%81"));
        assert!(disposition.ends_with("_1.csv"));
    }

    #[test]
    fn test_cors_headers() {
        let resp = with_cors(no_content());
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }
}
