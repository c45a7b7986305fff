//! XML-RPC transport.
//!
//! The single parameter must be a struct; it is decoded like a JSON body.
//! All records are collected before the response is written, so a receive
//! failure after the first record still produces a well-formed fault.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::time::Instant;

use crate::codec::xmlrpc::{marshal_fault, marshal_records, parse_call};
use crate::codec::{decode_map, Fault, STREAM_FAULT_CODE};
use crate::gateway::error::GatewayError;
use crate::gateway::invoke::{call_context, invoke};
use crate::gateway::json::log_rejection;
use crate::http::request::request_id;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::rpc::RecvError;

pub async fn handle_xmlrpc(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let start = Instant::now();
    let request_id = request_id(&headers);
    let mut method = String::new();

    let response = match run_call(&state, &headers, &body, &request_id, &mut method).await {
        Ok(document) => {
            let mut response = (StatusCode::OK, document).into_response();
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/xml"));
            response
        }
        Err(e) => {
            log_rejection(&request_id, &method, &e);
            e.into_response()
        }
    };

    let label = if state.table.input(&method).is_some() { method.as_str() } else { "unknown" };
    metrics::record_request("xmlrpc", label, response.status().as_u16(), start);
    response
}

async fn run_call(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
    request_id: &str,
    method: &mut String,
) -> Result<String, GatewayError> {
    let call = parse_call(body)?;
    method.clone_from(&call.name);
    let mut input = state
        .table
        .input(&call.name)
        .ok_or_else(|| GatewayError::UnknownMethod(call.name.clone()))?;
    let params = call.into_struct_param()?;
    let mode = decode_map(input.as_mut(), params, &state.pools)?;
    tracing::debug!(request_id = %request_id, method = %method, mode = mode.as_str(), "Decoded XML-RPC params");

    let ctx = call_context(state, headers, request_id);
    let mut invocation = invoke(state, method.as_str(), ctx, input).await?;

    let mut records = vec![invocation.first];
    loop {
        match invocation.recv.recv().await {
            Ok(record) => records.push(record),
            Err(RecvError::Exhausted) => break,
            Err(RecvError::Status(status)) => {
                metrics::record_stream_error("recv");
                tracing::error!(
                    request_id = %request_id,
                    method = %method,
                    received = records.len(),
                    error = %status,
                    "Stream failed, answering with a fault"
                );
                return Ok(marshal_fault(&Fault::new(STREAM_FAULT_CODE, status.to_string())));
            }
        }
    }
    Ok(marshal_records(&records)?)
}
