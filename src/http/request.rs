//! Request inspection.
//!
//! # Responsibilities
//! - Generate and propagate a unique request ID (UUID v4)
//! - Extract HTTP Basic credentials
//! - Extract an explicit deadline from `grpc-timeout`
//! - Resolve the method name and the `merge` override of the JSON transport
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Malformed optional headers are ignored, not rejected

use axum::http::{header, HeaderMap, HeaderName};
use base64::Engine;
use std::time::Duration;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::resilience::timeouts::parse_grpc_timeout;
use crate::rpc::context::BasicAuth;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const GRPC_TIMEOUT: &str = "grpc-timeout";

/// Layer assigning `x-request-id` to requests that lack one.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), MakeRequestUuid)
}

/// Layer copying `x-request-id` onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID))
}

/// Request ID assigned by the set layer, or `unknown`.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Credentials from an `Authorization: Basic ...` header.
pub fn basic_auth(headers: &HeaderMap) -> Option<BasicAuth> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some(BasicAuth::new(username, password))
}

/// Explicit deadline requested by the client.
pub fn grpc_timeout(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(GRPC_TIMEOUT)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_grpc_timeout)
}

/// The method name is the last non-empty path segment.
pub fn method_name(path: &str) -> Option<&str> {
    path.rsplit('/').find(|segment| !segment.is_empty())
}

/// Merge mode: `merge=1` forces it on, `merge=0` off, anything else keeps the default.
pub fn merge_mode(query: Option<&str>, default: bool) -> bool {
    let Some(query) = query else {
        return default;
    };
    let mut mode = default;
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("merge", "1")) => mode = true,
            Some(("merge", "0")) => mode = false,
            _ => {}
        }
    }
    mode
}
