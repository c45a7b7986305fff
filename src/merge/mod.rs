//! Stream-merge subsystem.
//!
//! # Data Flow
//! ```text
//! first Record + Receiver
//!     → engine.rs: classify fields by descriptor kind
//!         scalars (first record only) ──────────────┐
//!         primary sequence ─── trim.rs ─────────────┼─→ output.rs ResponseWriter → ChunkSink
//!         other sequences ──── trim.rs → spill.rs ──┘   (drained after the stream ends)
//! ```
//!
//! # Design Decisions
//! - Memory is bounded by the number of distinct sequence fields, not stream length
//! - Spill resources belong to one merge session and are released when it ends
//! - Errors after the first byte cannot change the HTTP status; callers log them

pub mod engine;
pub mod output;
pub mod spill;
pub mod trim;

pub use engine::{merge_stream, write_records, MergeError, MergeSummary};
pub use output::{ChunkSink, ResponseWriter, SinkClosed};
pub use spill::{SpillError, SpillReader, SpillResource, SpillStore};
pub use trim::trim_brackets;
