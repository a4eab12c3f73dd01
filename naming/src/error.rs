use thiserror::Error;

/// Errors surfaced by the naming service operations.
#[derive(Debug, Error, PartialEq)]
pub enum NamingError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("illegal state: {0}")]
    IllegalState(String),
}

impl From<dfs_wire::PathError> for NamingError {
    fn from(value: dfs_wire::PathError) -> Self {
        NamingError::InvalidArgument(value.to_string())
    }
}
