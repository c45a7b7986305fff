//! RPC boundary subsystem.
//!
//! # Data Flow
//! ```text
//! DispatchTable (built at startup)
//!     → input(name) → fresh Record (record.rs descriptor-driven)
//!     → call(name, CallContext, Record, CallOptions)
//!           context.rs: deadline + forwarded Basic credentials
//!           credentials.rs: `authorization` metadata for the outbound call
//!     → Box<dyn Receiver> (receiver.rs)
//!     → recv() until RecvError::Exhausted or a fatal Status (status.rs)
//! ```
//!
//! # Design Decisions
//! - Everything the gateway knows about a message comes from its static descriptor
//! - Outbound transport setup is owned by the dispatch table implementation

pub mod context;
pub mod credentials;
pub mod dispatch;
pub mod receiver;
pub mod record;
pub mod status;

pub use context::{BasicAuth, CallContext, BASIC_AUTH_KEY};
pub use credentials::BasicAuthCredentials;
pub use dispatch::{CallOptions, CallResult, DispatchTable, MethodTable};
pub use receiver::{ChannelReceiver, Receiver, RecvError, VecReceiver};
pub use record::{FieldDescriptor, FieldKind, FieldType, Record, RecordDescriptor, Schema};
pub use status::{Code, Status};
