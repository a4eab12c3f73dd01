//! A storage node of the file-system coordinator.
//!
//! Persists file bytes on a local directory subtree, serves read/write/size
//! operations to clients, and accepts create/delete/copy commands from the
//! naming service.

pub mod server;
pub mod store;

pub use store::{LocalStore, StoreError};
