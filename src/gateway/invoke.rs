//! The pre-commit half shared by both transports.
//!
//! # Responsibilities
//! - Build the call context: request ID, deadline, forwarded credentials
//! - Invoke the dispatch table and pull the first record
//!
//! # Design Decisions
//! - Nothing here writes to the response; every failure is still a clean HTTP error

use axum::http::HeaderMap;

use crate::gateway::error::GatewayError;
use crate::http::request::{basic_auth, grpc_timeout};
use crate::http::server::AppState;
use crate::resilience::timeouts::{apply_default_timeout, with_deadline, DeadlineReceiver};
use crate::rpc::{CallContext, CallOptions, Receiver, Record, RecvError};

/// A started call whose first record is in hand.
pub struct Invocation {
    pub first: Box<dyn Record>,
    pub recv: Box<dyn Receiver>,
}

/// Context for one inbound request.
pub fn call_context(state: &AppState, headers: &HeaderMap, request_id: &str) -> CallContext {
    let mut ctx = CallContext::new().with_request_id(request_id);
    if let Some(timeout) = grpc_timeout(headers) {
        ctx = ctx.with_timeout(timeout);
    }
    if let Some(auth) = basic_auth(headers) {
        ctx = ctx.with_basic_auth(auth);
    }
    apply_default_timeout(ctx, state.config.gateway.default_timeout())
}

/// Call `method` and receive its first record.
pub async fn invoke(
    state: &AppState,
    method: &str,
    ctx: CallContext,
    input: Box<dyn Record>,
) -> Result<Invocation, GatewayError> {
    let opts = CallOptions {
        metadata: state.credentials.request_metadata(&ctx),
    };
    let deadline = ctx.deadline();
    tracing::debug!(method = %method, context = ?ctx, "Calling method");

    let recv = with_deadline(deadline, state.table.call(method, ctx, input, opts)).await??;
    let mut recv: Box<dyn Receiver> = Box::new(DeadlineReceiver::new(recv, deadline));
    let first = match recv.recv().await {
        Ok(first) => first,
        Err(RecvError::Exhausted) => return Err(GatewayError::EmptyStream),
        Err(RecvError::Status(status)) => return Err(GatewayError::Call(status)),
    };
    Ok(Invocation { first, recv })
}
