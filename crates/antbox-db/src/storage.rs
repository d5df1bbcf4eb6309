//! Binary content stores.
//!
//! The store maps a node uuid to an opaque byte stream. The metadata
//! tuple handed to `write` is advisory only; the filesystem backend
//! keeps it in memory and derives blob paths from the uuid alone.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use antbox_core::{Error, Result, StorageProvider, WriteOptions};

/// In-memory [`StorageProvider`] implementation.
#[derive(Default)]
pub struct InMemoryStorageProvider {
    blobs: RwLock<HashMap<String, (Vec<u8>, WriteOptions)>>,
}

impl InMemoryStorageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advisory metadata recorded by the last write for `uuid`.
    pub async fn options(&self, uuid: &str) -> Option<WriteOptions> {
        self.blobs
            .read()
            .await
            .get(uuid)
            .map(|(_, options)| options.clone())
    }
}

#[async_trait]
impl StorageProvider for InMemoryStorageProvider {
    async fn write(&self, uuid: &str, content: &[u8], options: WriteOptions) -> Result<()> {
        let mut blobs = self.blobs.write().await;
        blobs.insert(uuid.to_string(), (content.to_vec(), options));
        Ok(())
    }

    async fn read(&self, uuid: &str) -> Result<Vec<u8>> {
        let blobs = self.blobs.read().await;
        blobs
            .get(uuid)
            .map(|(content, _)| content.clone())
            .ok_or_else(|| Error::NodeFileNotFound(uuid.to_string()))
    }

    async fn delete(&self, uuid: &str) -> Result<()> {
        let mut blobs = self.blobs.write().await;
        blobs
            .remove(uuid)
            .map(|_| ())
            .ok_or_else(|| Error::NodeFileNotFound(uuid.to_string()))
    }
}

/// Filesystem-backed [`StorageProvider`].
///
/// Blobs live flat under the root directory, named by uuid. The root
/// comes from `ANTBOX_STORAGE_ROOT` when built via [`Self::from_env`].
pub struct FsStorageProvider {
    root: PathBuf,
    options: RwLock<HashMap<String, WriteOptions>>,
}

impl FsStorageProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            options: RwLock::new(HashMap::new()),
        }
    }

    /// Build from the `ANTBOX_STORAGE_ROOT` environment variable.
    pub fn from_env() -> Result<Self> {
        let root = std::env::var("ANTBOX_STORAGE_ROOT")
            .map_err(|_| Error::BadRequest("ANTBOX_STORAGE_ROOT is not set".to_string()))?;
        Ok(Self::new(root))
    }

    fn blob_path(&self, uuid: &str) -> Result<PathBuf> {
        // uuids are uuid-v4 strings or `--slug--` identifiers; anything
        // else could escape the root.
        let valid = !uuid.is_empty()
            && uuid
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(Error::BadRequest(format!("invalid storage uuid: {}", uuid)));
        }
        Ok(self.root.join(uuid))
    }
}

#[async_trait]
impl StorageProvider for FsStorageProvider {
    async fn write(&self, uuid: &str, content: &[u8], options: WriteOptions) -> Result<()> {
        let path = self.blob_path(uuid)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&path, content).await?;
        debug!(node_id = uuid, bytes = content.len(), "blob written");
        self.options.write().await.insert(uuid.to_string(), options);
        Ok(())
    }

    async fn read(&self, uuid: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(uuid)?;
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NodeFileNotFound(uuid.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, uuid: &str) -> Result<()> {
        let path = self.blob_path(uuid)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                self.options.write().await.remove(uuid);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NodeFileNotFound(uuid.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> WriteOptions {
        WriteOptions {
            title: "Report".to_string(),
            parent: "--root--".to_string(),
            mimetype: "application/pdf".to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_write_read_delete() {
        let storage = InMemoryStorageProvider::new();
        storage.write("n1", b"hello", options()).await.unwrap();
        assert_eq!(storage.read("n1").await.unwrap(), b"hello");

        storage.delete("n1").await.unwrap();
        let err = storage.read("n1").await.unwrap_err();
        assert!(matches!(err, Error::NodeFileNotFound(_)));
    }

    #[tokio::test]
    async fn test_memory_write_replaces() {
        let storage = InMemoryStorageProvider::new();
        storage.write("n1", b"first", options()).await.unwrap();
        storage.write("n1", b"second", options()).await.unwrap();
        assert_eq!(storage.read("n1").await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_memory_delete_missing_is_not_found() {
        let storage = InMemoryStorageProvider::new();
        let err = storage.delete("missing").await.unwrap_err();
        assert!(matches!(err, Error::NodeFileNotFound(_)));
    }

    #[tokio::test]
    async fn test_memory_keeps_advisory_options() {
        let storage = InMemoryStorageProvider::new();
        storage.write("n1", b"x", options()).await.unwrap();
        let recorded = storage.options("n1").await.unwrap();
        assert_eq!(recorded.mimetype, "application/pdf");
    }

    #[tokio::test]
    async fn test_fs_write_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorageProvider::new(dir.path());

        storage.write("n1", b"content", options()).await.unwrap();
        assert_eq!(storage.read("n1").await.unwrap(), b"content");

        storage.delete("n1").await.unwrap();
        let err = storage.read("n1").await.unwrap_err();
        assert!(matches!(err, Error::NodeFileNotFound(_)));
    }

    #[tokio::test]
    async fn test_fs_write_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorageProvider::new(dir.path());
        storage.write("n1", b"first", options()).await.unwrap();
        storage.write("n1", b"second", options()).await.unwrap();
        assert_eq!(storage.read("n1").await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_fs_rejects_path_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsStorageProvider::new(dir.path());
        let err = storage
            .write("../escape", b"x", options())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));

        let err = storage.read("a/b").await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }
}
