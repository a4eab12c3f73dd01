use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use dfs_wire::client::ClientError;
use dfs_wire::RegisterRequest;

use crate::commands::StorageCommands;
use crate::registry::StorageNode;
use crate::{NamingConfig, NamingService};

mod locking;

/// One outbound command as observed by the recording transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Command {
    Create {
        command_port: u16,
        path: String,
    },
    Delete {
        command_port: u16,
        path: String,
    },
    Copy {
        command_port: u16,
        path: String,
        src_ip: String,
        src_client_port: u16,
    },
}

/// Test transport: records every command and confirms it, unless told to
/// refuse creations.
#[derive(Default)]
pub struct RecordingCommands {
    commands: Mutex<Vec<Command>>,
    refuse_create: bool,
}

impl RecordingCommands {
    pub fn refusing_creates() -> Self {
        RecordingCommands {
            commands: Mutex::new(Vec::new()),
            refuse_create: true,
        }
    }

    pub fn recorded(&self) -> Vec<Command> {
        self.commands.lock().clone()
    }

    /// Polls until `pred` holds for the recorded commands. Background
    /// workers apply replication asynchronously, so tests wait rather than
    /// assert immediately.
    pub async fn wait_until(&self, pred: impl Fn(&[Command]) -> bool) -> Vec<Command> {
        for _ in 0..400 {
            {
                let commands = self.commands.lock();
                if pred(&commands) {
                    return commands.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for commands: {:?}", self.recorded());
    }
}

#[async_trait]
impl StorageCommands for RecordingCommands {
    async fn create(&self, node: &StorageNode, path: &str) -> Result<bool, ClientError> {
        self.commands.lock().push(Command::Create {
            command_port: node.command_port,
            path: path.to_owned(),
        });
        Ok(!self.refuse_create)
    }

    async fn delete(&self, node: &StorageNode, path: &str) -> Result<bool, ClientError> {
        self.commands.lock().push(Command::Delete {
            command_port: node.command_port,
            path: path.to_owned(),
        });
        Ok(true)
    }

    async fn copy(
        &self,
        node: &StorageNode,
        path: &str,
        src: &StorageNode,
    ) -> Result<bool, ClientError> {
        self.commands.lock().push(Command::Copy {
            command_port: node.command_port,
            path: path.to_owned(),
            src_ip: src.storage_ip.clone(),
            src_client_port: src.client_port,
        });
        Ok(true)
    }
}

pub fn fixture() -> (Arc<NamingService>, Arc<RecordingCommands>) {
    let commands = Arc::new(RecordingCommands::default());
    let service = NamingService::new(NamingConfig::default(), commands.clone());
    (service, commands)
}

pub fn registration(client_port: u16, command_port: u16, files: &[&str]) -> RegisterRequest {
    RegisterRequest {
        storage_ip: "127.0.0.1".to_owned(),
        client_port,
        command_port,
        files: files.iter().map(|f| (*f).to_owned()).collect(),
    }
}

/// Runs `threshold` shared lock/unlock cycles on `path`.
pub async fn shared_cycles(service: &NamingService, path: &str, cycles: u32) {
    for _ in 0..cycles {
        service.lock(path, false).await.expect("shared lock");
        service.unlock(path).expect("unlock");
    }
}
