//! JSON transport: `POST /<anything>/<Method>`.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use std::time::Instant;

use crate::codec::decode_body;
use crate::gateway::error::GatewayError;
use crate::gateway::invoke::{call_context, invoke, Invocation};
use crate::gateway::stream;
use crate::http::request::{merge_mode, method_name, request_id};
use crate::http::server::AppState;
use crate::observability::metrics;

pub async fn handle_json(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let start = Instant::now();
    let request_id = request_id(&headers);
    let method = method_name(uri.path()).unwrap_or_default().to_string();

    let response = match start_call(&state, &method, &headers, &body, &request_id).await {
        Ok(invocation) => {
            let merge = merge_mode(uri.query(), state.config.gateway.merge_by_default);
            stream::json_body(state.clone(), method.clone(), request_id, invocation, merge)
        }
        Err(e) => {
            log_rejection(&request_id, &method, &e);
            e.into_response()
        }
    };

    let label = if state.table.input(&method).is_some() { method.as_str() } else { "unknown" };
    metrics::record_request("json", label, response.status().as_u16(), start);
    response
}

async fn start_call(
    state: &AppState,
    method: &str,
    headers: &HeaderMap,
    body: &[u8],
    request_id: &str,
) -> Result<Invocation, GatewayError> {
    if method.is_empty() {
        return Err(GatewayError::MissingMethod);
    }
    let mut input = state
        .table
        .input(method)
        .ok_or_else(|| GatewayError::UnknownMethod(method.to_string()))?;
    let mode = decode_body(input.as_mut(), body, &state.pools)?;
    tracing::debug!(request_id = %request_id, method = %method, mode = mode.as_str(), "Decoded request");

    let ctx = call_context(state, headers, request_id);
    invoke(state, method, ctx, input).await
}

pub(crate) fn log_rejection(request_id: &str, method: &str, error: &GatewayError) {
    let status = error.status_code();
    if status.is_server_error() {
        tracing::error!(request_id = %request_id, method = %method, status = status.as_u16(), error = %error, "Request failed");
    } else {
        tracing::warn!(request_id = %request_id, method = %method, status = status.as_u16(), error = %error, "Request rejected");
    }
}
