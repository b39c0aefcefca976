//! Response subsystem: from handler values to transport responses.
//!
//! # Data Flow
//! ```text
//! handler → ResponseValue (value.rs)
//!     → serialize(value, event, config)   (serialize.rs)
//!         merges event.response (status, status text, headers)
//!         infers content-type / content-length
//!         drops bodies for HEAD and null-body statuses
//!     → PreparedResponse { status, status_text, headers, Body } (body.rs)
//!     → transport adapter
//! ```

mod body;
mod serialize;
mod value;

pub use body::{body_stream, Blob, Body, BodyStream, PreparedResponse};
pub use serialize::{is_null_body_status, serialize, JSON_CONTENT_TYPE, NULL_BODY_STATUSES};
pub use value::{ResponseValue, Unsendable};
