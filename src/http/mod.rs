//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, limits, request ID, access spans)
//!     → request.rs (request ID, credentials, deadline, method name)
//!     → gateway handlers (JSON or XML-RPC)
//!     → streamed response
//! ```

pub mod request;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, HttpServer};
