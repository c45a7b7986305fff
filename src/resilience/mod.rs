//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request:
//!     → grpc-timeout header (timeouts.rs parse_grpc_timeout) → explicit deadline
//!     → else gateway.default_timeout_secs (apply_default_timeout)
//!     → call and every recv race the deadline (with_deadline, DeadlineReceiver)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every call has a deadline unless the
//!   default is explicitly disabled
//! - An explicit deadline is never replaced by the default
//! - No retries: each call is a single logical invocation

pub mod timeouts;

pub use timeouts::{apply_default_timeout, parse_grpc_timeout, with_deadline, DeadlineReceiver};
