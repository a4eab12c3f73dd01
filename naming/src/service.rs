//! The naming service proper: namespace, registry, ledger and lock state
//! behind one service-wide mutex, composed into the externally visible
//! operations.
//!
//! The mutex guards state inspection and queueing decisions only and is
//! never held across an await: waiting for a lock happens on a per-waiter
//! oneshot, outbound storage commands run with the mutex released.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{instrument, warn};

use dfs_wire::{DfsPath, RegisterRequest};

use crate::commands::StorageCommands;
use crate::error::NamingError;
use crate::lock::{Acquisition, RootLock};
use crate::namespace::{Namespace, NodeRef};
use crate::registry::{Registry, StorageNode};
use crate::replica::ReplicaLedger;
use crate::replicator::{ReplicaTask, Replicator};

#[derive(Clone, Debug)]
pub struct NamingConfig {
    /// Shared acquisitions of a single-hosted file before a copy is
    /// scheduled.
    pub replication_threshold: u32,
    /// Worker lanes applying replication and invalidation.
    pub replication_workers: usize,
}

impl Default for NamingConfig {
    fn default() -> Self {
        NamingConfig {
            replication_threshold: 10,
            replication_workers: 4,
        }
    }
}

/// Everything the service-wide mutex protects.
#[derive(Default)]
pub struct State {
    pub namespace: Namespace,
    pub registry: Registry,
    pub ledger: ReplicaLedger,
    pub root_lock: RootLock,
}

pub struct NamingService {
    state: Arc<Mutex<State>>,
    commands: Arc<dyn StorageCommands>,
    replicator: Replicator,
    config: NamingConfig,
}

impl NamingService {
    /// Requires a running tokio runtime (the replication workers are spawned
    /// here).
    pub fn new(config: NamingConfig, commands: Arc<dyn StorageCommands>) -> Arc<Self> {
        let state = Arc::new(Mutex::new(State::default()));
        let replicator =
            Replicator::spawn(config.replication_workers, state.clone(), commands.clone());
        Arc::new(NamingService {
            state,
            commands,
            replicator,
            config,
        })
    }

    pub fn is_valid_path(path: &str) -> bool {
        path.parse::<DfsPath>().is_ok()
    }

    /// Absorbs a storage node registration and returns the files the node
    /// must delete locally because they are already known.
    #[instrument(skip(self, registration), fields(command_port = registration.command_port))]
    pub fn register(&self, registration: RegisterRequest) -> Result<Vec<String>, NamingError> {
        let mut state = self.state.lock();
        if state.registry.is_registered(&registration) {
            return Err(NamingError::IllegalState(
                "this storage node is already registered".to_owned(),
            ));
        }

        let node = StorageNode::from(&registration);
        let mut duplicates = Vec::new();
        for file in &registration.files {
            let path: DfsPath = match file.parse() {
                Ok(path) => path,
                Err(e) => {
                    warn!(file = %file, err = %e, "ignoring unusable path in registration");
                    continue;
                }
            };
            if path.is_root() {
                continue;
            }
            let canonical = path.to_string();
            if state.registry.contains_file(&canonical) || !state.namespace.ensure_file(&path) {
                // already known, or the name is taken by a directory; either
                // way the node has to drop its copy
                duplicates.push(file.clone());
                continue;
            }
            state.registry.add_file(&canonical, &node);
            state.ledger.add_host(&canonical, node.command_port);
        }
        state.registry.add_registration(registration);
        Ok(duplicates)
    }

    pub fn is_directory(&self, raw: &str) -> Result<bool, NamingError> {
        let path: DfsPath = raw.parse()?;
        self.state.lock().namespace.is_directory(&path)
    }

    pub fn is_file(&self, raw: &str) -> Result<bool, NamingError> {
        let path: DfsPath = raw.parse()?;
        self.state.lock().namespace.is_file(&path)
    }

    pub fn list(&self, raw: &str) -> Result<Vec<String>, NamingError> {
        let path: DfsPath = raw.parse()?;
        self.state.lock().namespace.list(&path)
    }

    /// The storage node answering client operations for a file.
    pub fn storage_location(&self, raw: &str) -> Result<StorageNode, NamingError> {
        let path: DfsPath = raw.parse()?;
        let canonical = path.to_string();
        let state = self.state.lock();
        if !state.registry.contains_file(&canonical) {
            return Err(NamingError::NotFound(canonical));
        }
        state
            .registry
            .primary_of(&canonical)
            .cloned()
            .ok_or(NamingError::NotFound(canonical))
    }

    #[instrument(skip(self))]
    pub fn create_directory(&self, raw: &str) -> Result<bool, NamingError> {
        let path: DfsPath = raw.parse()?;
        self.state.lock().namespace.create_directory(&path)
    }

    /// Creates a file by commanding one storage node to materialize it.
    /// Nothing is committed unless the node confirms.
    #[instrument(skip(self))]
    pub async fn create_file(&self, raw: &str) -> Result<bool, NamingError> {
        let path: DfsPath = raw.parse()?;
        let canonical = path.to_string();

        let target = {
            let state = self.state.lock();
            if !state.namespace.file_slot(&path)? {
                return Ok(false);
            }
            state
                .registry
                .first_node()
                .cloned()
                .ok_or_else(|| NamingError::IllegalState("no storage node registered".to_owned()))?
        };

        let created = match self.commands.create(&target, &canonical).await {
            Ok(created) => created,
            Err(e) => {
                warn!(path = %canonical, err = %e, "storage_create failed");
                false
            }
        };
        if !created {
            return Ok(false);
        }

        let mut state = self.state.lock();
        if !state.namespace.commit_file(&path) {
            // lost the name while the node was creating; the client sees the
            // same answer as for any taken name
            return Ok(false);
        }
        state.registry.add_file(&canonical, &target);
        state.ledger.add_host(&canonical, target.command_port);
        Ok(true)
    }

    /// Deletes a file or directory subtree. Every host of every file beneath
    /// the path is commanded to drop its copy; storage-side failures are
    /// logged and do not fail the operation.
    #[instrument(skip(self))]
    pub async fn delete(&self, raw: &str) -> Result<bool, NamingError> {
        let path: DfsPath = raw.parse()?;
        if path.is_root() {
            return Ok(false);
        }
        {
            let state = self.state.lock();
            Self::classify(&state, &path)?;
        }

        let parent = path.parent().expect("non-root path has a parent");
        self.lock_path(&parent, true).await?;

        let victims: Vec<(String, Vec<StorageNode>)> = {
            let state = self.state.lock();
            state
                .namespace
                .files_under(&path)
                .into_iter()
                .map(|file| {
                    let canonical = file.to_string();
                    let hosts = state
                        .ledger
                        .get(&canonical)
                        .map(|entry| {
                            entry
                                .hosts
                                .iter()
                                .filter_map(|port| state.registry.node_by_port(*port).cloned())
                                .collect()
                        })
                        .unwrap_or_default();
                    (canonical, hosts)
                })
                .collect()
        };

        for (file, hosts) in &victims {
            for host in hosts {
                match self.commands.delete(host, file).await {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(file = %file, command_port = host.command_port, "node had no copy")
                    }
                    Err(e) => warn!(file = %file, err = %e, "storage_delete failed"),
                }
            }
        }

        {
            let mut state = self.state.lock();
            state.namespace.remove(&path);
            for (file, _) in &victims {
                state.registry.remove_file(file);
                state.ledger.remove(file);
            }
        }

        self.release_path(&parent);
        Ok(true)
    }

    /// Locks a path for shared or exclusive access, blocking until granted.
    /// Locking a file counts as an access and may schedule replication work.
    #[instrument(skip(self))]
    pub async fn lock(&self, raw: &str, exclusive: bool) -> Result<(), NamingError> {
        let path: DfsPath = raw.parse()?;
        self.lock_path(&path, exclusive).await
    }

    /// Unlocks a previously locked path. Never blocks.
    #[instrument(skip(self))]
    pub fn unlock(&self, raw: &str) -> Result<(), NamingError> {
        let path: DfsPath = raw.parse()?;
        let mut state = self.state.lock();

        // a path that cannot be found cannot have been locked; client bug
        if Self::classify(&state, &path).is_err() {
            return Err(NamingError::InvalidArgument(format!(
                "{} cannot be found",
                path
            )));
        }
        if !Self::release_one(&mut state, &path) {
            return Err(NamingError::InvalidArgument(format!(
                "{} is not locked",
                path
            )));
        }

        // ancestors in parent-to-root order
        let ancestors: Vec<DfsPath> = path.ancestors().collect();
        for prefix in ancestors.iter().rev() {
            Self::release_one(&mut state, prefix);
        }
        Ok(())
    }

    /// Acquires shared locks on every ancestor root-to-parent, then the
    /// requested lock on the path itself. On failure the already acquired
    /// prefix is released bottom-up and the namespace is left untouched.
    async fn lock_path(&self, path: &DfsPath, exclusive: bool) -> Result<(), NamingError> {
        let target_is_file = {
            let state = self.state.lock();
            Self::classify(&state, path)?
        };

        let mut held: Vec<DfsPath> = Vec::with_capacity(path.depth());
        for prefix in path.ancestors() {
            if let Err(e) = self.acquire_one(&prefix, false, None).await {
                self.release_held(&held);
                return Err(e);
            }
            held.push(prefix);
        }
        if let Err(e) = self.acquire_one(path, exclusive, Some(target_is_file)).await {
            self.release_held(&held);
            return Err(e);
        }

        if target_is_file {
            self.after_file_lock(path, exclusive);
        }
        Ok(())
    }

    /// Acquires one lock along the chain, waiting outside the mutex if it is
    /// contended. Existence is re-checked before queueing and after waking,
    /// since the node may be deleted while we wait.
    async fn acquire_one(
        &self,
        path: &DfsPath,
        exclusive: bool,
        expect_file: Option<bool>,
    ) -> Result<(), NamingError> {
        let acquisition = {
            let mut state = self.state.lock();
            Self::check_exists(&state, path, expect_file)?;
            if path.is_root() {
                state.root_lock.acquire(exclusive)
            } else {
                state
                    .namespace
                    .node_lock_mut(path)
                    .ok_or_else(|| NamingError::NotFound(path.to_string()))?
                    .acquire(exclusive)
            }
        };

        if let Acquisition::Queued(rx) = acquisition {
            if rx.await.is_err() {
                // the node, and its queue, went away while we waited
                return Err(NamingError::NotFound(path.to_string()));
            }
            let state = self.state.lock();
            Self::check_exists(&state, path, expect_file)?;
        }
        Ok(())
    }

    /// Internal release of a full chain: the path itself, then its ancestors
    /// bottom-up.
    fn release_path(&self, path: &DfsPath) {
        let mut state = self.state.lock();
        Self::release_one(&mut state, path);
        let ancestors: Vec<DfsPath> = path.ancestors().collect();
        for prefix in ancestors.iter().rev() {
            Self::release_one(&mut state, prefix);
        }
    }

    fn release_held(&self, held: &[DfsPath]) {
        let mut state = self.state.lock();
        for prefix in held.iter().rev() {
            Self::release_one(&mut state, prefix);
        }
    }

    fn release_one(state: &mut State, path: &DfsPath) -> bool {
        if path.is_root() {
            state.root_lock.release()
        } else {
            match state.namespace.node_lock_mut(path) {
                Some(lock) => lock.release(),
                None => false,
            }
        }
    }

    /// `Ok(true)` when the path is a known file, `Ok(false)` for a
    /// directory. Files must be in the global file set.
    fn classify(state: &State, path: &DfsPath) -> Result<bool, NamingError> {
        match state.namespace.resolve(path) {
            Some(NodeRef::Root) | Some(NodeRef::Directory(_)) => Ok(false),
            Some(NodeRef::File(_)) => {
                if state.registry.contains_file(&path.to_string()) {
                    Ok(true)
                } else {
                    Err(NamingError::NotFound(path.to_string()))
                }
            }
            None => Err(NamingError::NotFound(path.to_string())),
        }
    }

    fn check_exists(
        state: &State,
        path: &DfsPath,
        expect_file: Option<bool>,
    ) -> Result<(), NamingError> {
        let is_file = Self::classify(state, path)?;
        match expect_file {
            // ancestors must still be directories
            None | Some(false) if is_file => Err(NamingError::NotFound(path.to_string())),
            Some(true) if !is_file => Err(NamingError::NotFound(path.to_string())),
            _ => Ok(()),
        }
    }

    /// Replication hook, run under the mutex right after a file's own lock
    /// was granted. Shared accesses count towards replication; an exclusive
    /// access invalidates one stale replica.
    fn after_file_lock(&self, path: &DfsPath, exclusive: bool) {
        let canonical = path.to_string();
        let task = {
            let mut state = self.state.lock();
            let State {
                ledger, registry, ..
            } = &mut *state;
            let Some(entry) = ledger.get_mut(&canonical) else {
                return;
            };
            if exclusive {
                if entry.is_replicated && entry.replicated_count > 1 {
                    entry
                        .hosts
                        .last()
                        .and_then(|port| registry.node_by_port(*port))
                        .map(|host| ReplicaTask::Evict {
                            path: canonical.clone(),
                            host: host.clone(),
                        })
                } else {
                    None
                }
            } else {
                entry.access_count += 1;
                if entry.access_count >= self.config.replication_threshold && !entry.is_replicated
                {
                    entry.access_count = 1;
                    let src = registry.primary_of(&canonical).cloned();
                    let dst = src
                        .as_ref()
                        .and_then(|s| registry.other_node(s.command_port))
                        .cloned();
                    match (src, dst) {
                        (Some(src), Some(dst)) => Some(ReplicaTask::Copy {
                            path: canonical.clone(),
                            src,
                            dst,
                        }),
                        _ => None,
                    }
                } else {
                    None
                }
            }
        };
        if let Some(task) = task {
            self.replicator.submit(task);
        }
    }

    #[cfg(test)]
    pub(crate) fn replica_entry(&self, path: &str) -> Option<crate::replica::ReplicaEntry> {
        self.state.lock().ledger.get(path).cloned()
    }
}
