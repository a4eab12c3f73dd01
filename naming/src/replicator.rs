//! Background replication and invalidation.
//!
//! A bounded pool of workers consumes task channels. Tasks are dispatched to
//! a lane by path hash, so the tasks of one file execute in order while
//! different files proceed independently. Submission never blocks: a full
//! lane drops the task, replication being best-effort.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::commands::StorageCommands;
use crate::registry::StorageNode;
use crate::service::State;

/// Pending tasks per lane; beyond this, new tasks are dropped.
const LANE_DEPTH: usize = 64;

#[derive(Debug)]
pub enum ReplicaTask {
    /// Make `dst` pull `path` from `src`'s client endpoint.
    Copy {
        path: String,
        src: StorageNode,
        dst: StorageNode,
    },
    /// Make `host` drop its copy of `path`.
    Evict { path: String, host: StorageNode },
}

impl ReplicaTask {
    fn path(&self) -> &str {
        match self {
            ReplicaTask::Copy { path, .. } => path,
            ReplicaTask::Evict { path, .. } => path,
        }
    }
}

pub struct Replicator {
    lanes: Vec<mpsc::Sender<ReplicaTask>>,
}

impl Replicator {
    /// Spawns `workers` lanes feeding off the shared service state.
    pub fn spawn(
        workers: usize,
        state: Arc<Mutex<State>>,
        commands: Arc<dyn StorageCommands>,
    ) -> Self {
        let workers = workers.max(1);
        let mut lanes = Vec::with_capacity(workers);
        for lane in 0..workers {
            let (tx, rx) = mpsc::channel(LANE_DEPTH);
            tokio::spawn(run_worker(lane, rx, state.clone(), commands.clone()));
            lanes.push(tx);
        }
        Replicator { lanes }
    }

    pub fn submit(&self, task: ReplicaTask) {
        let mut hasher = DefaultHasher::new();
        task.path().hash(&mut hasher);
        let lane = (hasher.finish() as usize) % self.lanes.len();
        if self.lanes[lane].try_send(task).is_err() {
            warn!(lane, "replication lane full, dropping task");
        }
    }
}

#[instrument(skip(rx, state, commands))]
async fn run_worker(
    lane: usize,
    mut rx: mpsc::Receiver<ReplicaTask>,
    state: Arc<Mutex<State>>,
    commands: Arc<dyn StorageCommands>,
) {
    while let Some(task) = rx.recv().await {
        match task {
            ReplicaTask::Copy { path, src, dst } => {
                match commands.copy(&dst, &path, &src).await {
                    Ok(true) => {
                        let mut state = state.lock();
                        let state = &mut *state;
                        if let Some(entry) = state.ledger.get_mut(&path) {
                            if !entry.hosts.contains(&dst.command_port) {
                                entry.hosts.push(dst.command_port);
                                entry.replicated_count += 1;
                            }
                            entry.is_replicated = true;
                            state.registry.add_holding(&path, dst.command_port);
                            info!(path = %path, dst = dst.command_port, "file replicated");
                        }
                    }
                    Ok(false) => warn!(path = %path, dst = dst.command_port, "destination refused copy"),
                    Err(e) => warn!(path = %path, err = %e, "replication failed"),
                }
            }
            ReplicaTask::Evict { path, host } => {
                match commands.delete(&host, &path).await {
                    Ok(true) => {
                        let mut state = state.lock();
                        let state = &mut *state;
                        if let Some(entry) = state.ledger.get_mut(&path) {
                            if let Some(at) =
                                entry.hosts.iter().rposition(|p| *p == host.command_port)
                            {
                                entry.hosts.remove(at);
                                entry.replicated_count = entry.replicated_count.saturating_sub(1);
                            }
                            entry.is_replicated = false;
                            state.registry.remove_holding(&path, host.command_port);
                            info!(path = %path, host = host.command_port, "stale replica invalidated");
                        }
                    }
                    Ok(false) => warn!(path = %path, host = host.command_port, "host had no copy to drop"),
                    Err(e) => warn!(path = %path, err = %e, "invalidation failed"),
                }
            }
        }
    }
}
