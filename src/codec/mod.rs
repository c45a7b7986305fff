//! Payload codecs for the text transports.
//!
//! # Data Flow
//! ```text
//! JSON body ──────────────┐
//!                         ├─→ weak.rs: strict decode → (fail) → key casing (casing.rs)
//! XML-RPC <methodCall> ───┘        + empty-string drop + type coercion → Record
//!   (xmlrpc.rs parse_call)
//!
//! Records → xmlrpc.rs marshal_records / marshal_fault → <methodResponse>
//! ```
//!
//! # Design Decisions
//! - Both transports meet in one `serde_json::Value` shape before decoding
//! - Record descriptors drive coercion and XML-RPC value typing

pub mod casing;
pub mod weak;
pub mod xmlrpc;

pub use casing::camel_case;
pub use weak::{decode_body, decode_map, DecodeError, DecodeMode, WeakError};
pub use xmlrpc::{Fault, MethodCall, MethodResponse, XmlRpcError, STREAM_FAULT_CODE};
