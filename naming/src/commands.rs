//! Outbound command transport to storage nodes.
//!
//! The trait is the seam between the service logic and HTTP: the production
//! implementation POSTs to the node's command endpoint, tests substitute a
//! recorder.

use async_trait::async_trait;

use dfs_wire::client::{ClientError, HttpClient};
use dfs_wire::CopyRequest;

use crate::registry::StorageNode;

/// Command endpoints are reached on the loopback interface; nodes are
/// identified by their command port.
pub const COMMAND_HOST: &str = "127.0.0.1";

#[async_trait]
pub trait StorageCommands: Send + Sync {
    /// Asks `node` to materialize an empty file.
    async fn create(&self, node: &StorageNode, path: &str) -> Result<bool, ClientError>;

    /// Asks `node` to remove its copy of `path`.
    async fn delete(&self, node: &StorageNode, path: &str) -> Result<bool, ClientError>;

    /// Asks `node` to pull `path` from `src`'s client endpoint.
    async fn copy(&self, node: &StorageNode, path: &str, src: &StorageNode)
        -> Result<bool, ClientError>;
}

#[derive(Clone, Default)]
pub struct HttpStorageCommands {
    client: HttpClient,
}

impl HttpStorageCommands {
    pub fn new() -> Self {
        HttpStorageCommands::default()
    }
}

#[async_trait]
impl StorageCommands for HttpStorageCommands {
    async fn create(&self, node: &StorageNode, path: &str) -> Result<bool, ClientError> {
        self.client
            .storage_create(COMMAND_HOST, node.command_port, path)
            .await
    }

    async fn delete(&self, node: &StorageNode, path: &str) -> Result<bool, ClientError> {
        self.client
            .storage_delete(COMMAND_HOST, node.command_port, path)
            .await
    }

    async fn copy(
        &self,
        node: &StorageNode,
        path: &str,
        src: &StorageNode,
    ) -> Result<bool, ClientError> {
        self.client
            .storage_copy(
                COMMAND_HOST,
                node.command_port,
                &CopyRequest {
                    path: path.to_owned(),
                    server_ip: src.storage_ip.clone(),
                    server_port: src.client_port,
                },
            )
            .await
    }
}
