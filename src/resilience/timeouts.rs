//! Deadline enforcement.
//!
//! # Responsibilities
//! - Apply the default timeout to contexts without a deadline
//! - Parse the gRPC `grpc-timeout` header format
//! - Bound the call and every receive by the context deadline
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - An elapsed deadline surfaces as a `DeadlineExceeded` status, like an
//!   outbound call that timed out

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::rpc::context::CallContext;
use crate::rpc::receiver::{Receiver, RecvError};
use crate::rpc::record::Record;
use crate::rpc::status::Status;

/// Give `ctx` the default deadline unless it already has one.
pub fn apply_default_timeout(ctx: CallContext, default: Option<Duration>) -> CallContext {
    match (ctx.deadline(), default) {
        (None, Some(timeout)) => ctx.with_timeout(timeout),
        _ => ctx,
    }
}

/// Parse a `grpc-timeout` value: up to 8 digits and a unit (`H`, `M`, `S`, `m`, `u`, `n`).
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.len() < 2 || value.len() > 9 {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;
    match unit {
        "H" => Some(Duration::from_secs(amount * 3600)),
        "M" => Some(Duration::from_secs(amount * 60)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}

/// Run `fut` until `deadline`.
pub async fn with_deadline<F: Future>(deadline: Option<Instant>, fut: F) -> Result<F::Output, Status> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .map_err(|_| Status::deadline_exceeded("context deadline exceeded")),
        None => Ok(fut.await),
    }
}

/// Receiver whose `recv` fails with `DeadlineExceeded` once the deadline passes.
pub struct DeadlineReceiver {
    inner: Box<dyn Receiver>,
    deadline: Option<Instant>,
}

impl DeadlineReceiver {
    pub fn new(inner: Box<dyn Receiver>, deadline: Option<Instant>) -> Self {
        Self { inner, deadline }
    }
}

#[async_trait]
impl Receiver for DeadlineReceiver {
    async fn recv(&mut self) -> Result<Box<dyn Record>, RecvError> {
        match with_deadline(self.deadline, self.inner.recv()).await {
            Ok(result) => result,
            Err(status) => Err(RecvError::Status(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::receiver::ChannelReceiver;
    use crate::rpc::status::Code;

    #[tokio::test]
    async fn test_default_applies_only_when_absent() {
        let explicit = Instant::now() + Duration::from_secs(5);
        let ctx = CallContext::new().with_deadline(explicit);
        let ctx = apply_default_timeout(ctx, Some(Duration::from_secs(300)));
        assert_eq!(ctx.deadline(), Some(explicit));

        let ctx = apply_default_timeout(CallContext::new(), Some(Duration::from_secs(300)));
        assert!(ctx.remaining().unwrap() > Duration::from_secs(299));

        let ctx = apply_default_timeout(CallContext::new(), None);
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_parse_grpc_timeout() {
        assert_eq!(parse_grpc_timeout("1H"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_grpc_timeout("2M"), Some(Duration::from_secs(120)));
        assert_eq!(parse_grpc_timeout("30S"), Some(Duration::from_secs(30)));
        assert_eq!(parse_grpc_timeout("250m"), Some(Duration::from_millis(250)));
        assert_eq!(parse_grpc_timeout("7u"), Some(Duration::from_micros(7)));
        assert_eq!(parse_grpc_timeout("9n"), Some(Duration::from_nanos(9)));
        assert_eq!(parse_grpc_timeout("S"), None);
        assert_eq!(parse_grpc_timeout("10s"), None);
        assert_eq!(parse_grpc_timeout("-1S"), None);
        assert_eq!(parse_grpc_timeout("123456789S"), None);
    }

    #[tokio::test]
    async fn test_deadline_receiver_times_out() {
        let (_tx, inner) = ChannelReceiver::channel(1);
        let deadline = Instant::now() + Duration::from_millis(50);
        let mut recv = DeadlineReceiver::new(Box::new(inner), Some(deadline));
        match recv.recv().await {
            Err(RecvError::Status(status)) => assert_eq!(status.code(), Code::DeadlineExceeded),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_no_deadline_passes_through() {
        let out = with_deadline(None, async { 7 }).await.unwrap();
        assert_eq!(out, 7);
    }
}
