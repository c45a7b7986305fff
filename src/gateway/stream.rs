//! Post-commit body streaming.
//!
//! The response status and headers are sent as soon as the handler returns;
//! a spawned task then feeds the body through a bounded channel.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::gateway::invoke::Invocation;
use crate::http::server::AppState;
use crate::merge::{merge_stream, write_records, MergeError, ResponseWriter};
use crate::observability::metrics;

type BodySender = mpsc::Sender<Result<Bytes, std::io::Error>>;

/// Stream `invocation` as JSON, merged or one record per line.
pub fn json_body(state: AppState, method: String, request_id: String, invocation: Invocation, merge: bool) -> Response {
    let (tx, rx) = mpsc::channel(state.config.gateway.stream_buffer.max(1));
    tokio::spawn(async move {
        let Invocation { first, mut recv } = invocation;
        let mut out = ResponseWriter::new(tx, state.config.merge.flush_threshold_bytes);
        let result = if merge {
            merge_stream(first, recv.as_mut(), &mut out, &state.spills).await
        } else {
            write_records(first, recv.as_mut(), &mut out).await
        };
        match result {
            Ok(summary) => tracing::debug!(
                request_id = %request_id,
                method = %method,
                merge,
                records = summary.records,
                spilled_fields = summary.spilled_fields,
                spill_bytes = summary.spill_bytes,
                spill_failures = summary.spill_failures,
                "Stream complete"
            ),
            Err(e) => stream_failed(&state, &mut out, &request_id, &method, e).await,
        }
    });

    let mut response = Response::new(Body::from_stream(ReceiverStream::new(rx)));
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

async fn stream_failed(
    state: &AppState,
    out: &mut ResponseWriter<BodySender>,
    request_id: &str,
    method: &str,
    error: MergeError,
) {
    metrics::record_stream_error(error.stage());
    if let MergeError::Closed(_) = error {
        tracing::debug!(request_id = %request_id, method = %method, "Client went away mid-stream");
        return;
    }
    tracing::error!(
        request_id = %request_id,
        method = %method,
        stage = error.stage(),
        error = %error,
        "Stream failed after commit"
    );
    if state.config.gateway.error_trailer {
        let trailer = json!({ "Error": error.to_string() });
        let _ = out.write(format!("\n{}\n", trailer).as_bytes()).await;
    }
    let _ = out.flush().await;
}
