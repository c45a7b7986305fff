//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain in-flight responses → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, close
//! - Streaming responses already committed are allowed to finish
//! - The shutdown flag is latched in a `watch` channel, so a waiter that
//!   subscribes after the trigger still returns

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
