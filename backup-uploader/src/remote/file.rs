//! `file://` store: a directory on a locally mounted file system.

use super::locator::{validate_name, RemoteLocator};
use super::{RemoteStore, StoreError, StoreResult};
use crate::utils::errors::BackupError;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(locator: &RemoteLocator) -> Result<Self, BackupError> {
        let root = locator
            .to_file_path()
            .ok_or_else(|| BackupError::Config(format!("not a local directory locator: {}", locator)))?;
        Self::new(root)
    }

    /// The directory must already exist; it is never created here.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, BackupError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(BackupError::Config(format!(
                "remote directory {} does not exist",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, name: &str) -> StoreResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl RemoteStore for FileStore {
    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }

    fn atomic_replace(&self) -> bool {
        true
    }

    async fn write(&self, name: &str, data: Bytes, overwrite: bool) -> StoreResult<u64> {
        let path = self.object_path(name)?;

        let mut options = OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }

        let mut file = options.open(&path).await.map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => StoreError::AlreadyExists(name.to_string()),
            _ => StoreError::Io(e),
        })?;
        file.write_all(&data).await?;
        file.flush().await?;
        file.sync_all().await?;

        Ok(data.len() as u64)
    }

    async fn read(&self, name: &str) -> StoreResult<Bytes> {
        let path = self.object_path(name)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_if_exists(&self, name: &str) -> StoreResult<()> {
        let path = self.object_path(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn rename_or_replace(&self, from: &str, to: &str) -> StoreResult<()> {
        let from_path = self.object_path(from)?;
        let to_path = self.object_path(to)?;
        match fs::rename(&from_path, &to_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(from.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
