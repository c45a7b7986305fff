//! Request handlers for both transports.
//!
//! # Request flow
//! ```text
//! body ──► decode (strict, then weak) ──► invoke ──► first record ──┐
//!   any failure up to here: HTTP error with {"Error": ...}           │
//!                                                                    ▼
//!                                            commit: status + headers sent
//!                                                                    │
//!         JSON: merge engine or NDJSON, streamed ◄───────────────────┤
//!         XML-RPC: collect, marshal (fault on receive failure) ◄─────┘
//! ```

pub mod error;
pub mod index;
pub mod invoke;
pub mod json;
pub mod stream;
pub mod xmlrpc;

pub use error::GatewayError;
pub use index::{health, list_methods};
pub use json::handle_json;
pub use xmlrpc::handle_xmlrpc;
