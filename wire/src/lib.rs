//! Shared lower layer of the file-system coordinator: the path model used by
//! both services, the JSON bodies exchanged over HTTP, and typed client
//! helpers for the outbound calls.

pub mod client;
mod messages;
mod path;

pub use messages::*;
pub use path::{DfsPath, PathError};
