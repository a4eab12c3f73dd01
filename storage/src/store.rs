//! Byte storage on a local directory subtree.
//!
//! Protocol paths are relative to the store root. Commands are idempotent in
//! effect: creating an existing file or deleting a missing one answers
//! `false` rather than failing.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{instrument, warn};
use walkdir::WalkDir;

use dfs_wire::client::HttpClient;
use dfs_wire::DfsPath;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("out of bounds: {0}")]
    OutOfBounds(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Opens the store, creating the root directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(LocalStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a protocol path onto the local disk. `.` and `..` components are
    /// rejected so a path can never escape the root.
    fn resolve(&self, raw: &str) -> Result<(DfsPath, PathBuf), StoreError> {
        let path: DfsPath = raw
            .parse()
            .map_err(|e: dfs_wire::PathError| StoreError::InvalidArgument(e.to_string()))?;
        let mut full = self.root.clone();
        for component in path.components() {
            if component == "." || component == ".." {
                return Err(StoreError::InvalidArgument(format!(
                    "path component {:?} is not allowed",
                    component
                )));
            }
            full.push(component);
        }
        Ok((path, full))
    }

    pub async fn size(&self, raw: &str) -> Result<u64, StoreError> {
        let (_, full) = self.resolve(raw)?;
        let metadata = fs::metadata(&full)
            .await
            .map_err(|_| StoreError::NotFound(raw.to_owned()))?;
        if !metadata.is_file() {
            return Err(StoreError::NotFound(raw.to_owned()));
        }
        Ok(metadata.len())
    }

    #[instrument(skip(self))]
    pub async fn read(&self, raw: &str, offset: i64, length: i64) -> Result<Vec<u8>, StoreError> {
        if offset < 0 || length < 0 {
            return Err(StoreError::OutOfBounds(
                "offset and length must not be negative".to_owned(),
            ));
        }
        let size = self.size(raw).await?;
        let (offset, length) = (offset as u64, length as u64);
        if offset + length > size {
            return Err(StoreError::OutOfBounds(format!(
                "range {}+{} exceeds file size {}",
                offset, length, size
            )));
        }

        let (_, full) = self.resolve(raw)?;
        let mut file = File::open(&full).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Writes at `offset`, extending the file as needed.
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub async fn write(&self, raw: &str, offset: i64, data: &[u8]) -> Result<(), StoreError> {
        if offset < 0 {
            return Err(StoreError::OutOfBounds(
                "offset must not be negative".to_owned(),
            ));
        }
        let (_, full) = self.resolve(raw)?;
        let metadata = fs::metadata(&full)
            .await
            .map_err(|_| StoreError::NotFound(raw.to_owned()))?;
        if !metadata.is_file() {
            return Err(StoreError::NotFound(raw.to_owned()));
        }

        let mut file = OpenOptions::new().write(true).open(&full).await?;
        file.seek(SeekFrom::Start(offset as u64)).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    /// Creates an empty file, with parent directories as needed.
    #[instrument(skip(self))]
    pub async fn create(&self, raw: &str) -> Result<bool, StoreError> {
        let (path, full) = self.resolve(raw)?;
        if path.is_root() || fs::try_exists(&full).await? {
            return Ok(false);
        }
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        File::create(&full).await?;
        Ok(true)
    }

    /// Removes a file or directory tree, then prunes directories left empty
    /// on the way up.
    #[instrument(skip(self))]
    pub async fn delete(&self, raw: &str) -> Result<bool, StoreError> {
        let (path, full) = self.resolve(raw)?;
        if path.is_root() {
            return Ok(false);
        }
        let metadata = match fs::metadata(&full).await {
            Ok(metadata) => metadata,
            Err(_) => return Ok(false),
        };
        if metadata.is_dir() {
            fs::remove_dir_all(&full).await?;
        } else {
            fs::remove_file(&full).await?;
        }
        self.prune_empty_parents(&full).await;
        Ok(true)
    }

    async fn prune_empty_parents(&self, full: &Path) {
        let mut current = full.parent();
        while let Some(dir) = current {
            if dir == self.root {
                break;
            }
            // remove_dir refuses non-empty directories, ending the walk
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }

    /// Pulls the full contents of `raw` from a peer's client endpoint and
    /// stores them locally, overwriting any previous copy. Peer failures
    /// answer `false`.
    #[instrument(skip(self, client))]
    pub async fn copy_from_peer(
        &self,
        client: &HttpClient,
        raw: &str,
        peer_ip: &str,
        peer_client_port: u16,
    ) -> Result<bool, StoreError> {
        let (path, full) = self.resolve(raw)?;
        if path.is_root() {
            return Ok(false);
        }

        let size = match client.storage_size(peer_ip, peer_client_port, raw).await {
            Ok(size) => size,
            Err(e) => {
                warn!(err = %e, "peer did not answer the size request");
                return Ok(false);
            }
        };
        let data = match client
            .storage_read(peer_ip, peer_client_port, raw, 0, size as i64)
            .await
        {
            Ok(data) => data,
            Err(e) => {
                warn!(err = %e, "peer did not answer the read request");
                return Ok(false);
            }
        };

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full, &data).await?;
        Ok(true)
    }

    /// Walks the subtree, removing directories that hold no files, and
    /// returns the protocol paths of all regular files.
    pub fn scan(&self) -> Result<Vec<String>, StoreError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).contents_first(true) {
            let entry = entry.map_err(|e| StoreError::Io(e.into()))?;
            if entry.file_type().is_dir() {
                if entry.path() != self.root {
                    // only empty directories can be removed this way
                    let _ = std::fs::remove_dir(entry.path());
                }
            } else if entry.file_type().is_file() {
                files.push(self.protocol_path(entry.path()));
            }
        }
        files.sort();
        Ok(files)
    }

    fn protocol_path(&self, full: &Path) -> String {
        let relative = full
            .strip_prefix(&self.root)
            .expect("walked path lies under the root");
        let mut out = String::new();
        for component in relative.components() {
            out.push('/');
            out.push_str(&component.as_os_str().to_string_lossy());
        }
        out
    }
}
