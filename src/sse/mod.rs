//! Server-sent events.
//!
//! # Data Flow
//! ```text
//! handler
//!     → EventStream::new(&config.sse)
//!     → stream.send(&mut event)      sets SSE headers + 200, returns EventStreamReader
//!     → return reader as ResponseValue::Stream
//! pushing task
//!     → push / push_all              formatted by message.rs
//!         paused  → appended to the pending buffer
//!         active  → written to the bounded channel
//!     → close                        ends the body once queued chunks drain
//! transport drops the body
//!     → watcher observes the closed channel → auto-close / on_closed callbacks
//! ```
//!
//! # Design Decisions
//! - Writes to a departed peer are swallowed
//! - State lives behind a mutex that is never held across an await
//! - The watcher holds only a weak reference, so dropping every handle ends the body

mod message;
mod stream;

pub use message::{format_messages, EventStreamMessage};
pub use stream::{EventStream, EventStreamReader};
