//! JSON bodies exchanged between clients, the naming service and the storage
//! nodes. Field names are part of the protocol.

use serde::{Deserialize, Serialize};

/// Error envelope carried by every non-success response.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ErrorBody {
    pub exception_type: String,
    pub exception_info: String,
}

impl ErrorBody {
    pub fn new(exception_type: &str, exception_info: impl Into<String>) -> Self {
        ErrorBody {
            exception_type: exception_type.to_owned(),
            exception_info: exception_info.into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PathRequest {
    pub path: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ListResponse {
    pub files: Vec<String>,
}

/// Location of the storage node serving a file's client operations.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StorageLocation {
    pub server_ip: String,
    pub server_port: u16,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LockRequest {
    pub path: String,
    pub exclusive: bool,
}

/// Registration submitted by a storage node when it comes up.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RegisterRequest {
    pub storage_ip: String,
    pub client_port: u16,
    pub command_port: u16,
    pub files: Vec<String>,
}

/// The files the registering node must delete locally.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RegisterResponse {
    pub files: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SizeResponse {
    pub size: u64,
}

/// Offsets and lengths are signed on the wire so out-of-range values are
/// reported as `IndexOutOfBoundsException` rather than rejected during
/// deserialization.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReadRequest {
    pub path: String,
    pub offset: i64,
    pub length: i64,
}

/// `data` is base64.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReadResponse {
    pub data: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WriteRequest {
    pub path: String,
    pub offset: i64,
    pub data: String,
}

/// Instructs a storage node to pull a file from the named peer.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CopyRequest {
    pub path: String,
    pub server_ip: String,
    pub server_port: u16,
}
