//! Pluggable blob storage backends for document content.
//!
//! The scrubber only needs two operations from the object store: list the
//! objects under a prefix and delete one object. Backends:
//!
//! - **Filesystem**: blobs as files under a root directory
//! - **S3**: blobs in S3-compatible object storage
//! - **Memory**: in-process map with call counting and failure injection
//!
//! The choice of backend is configured via `[storage.blobs]` in the config.

use std::{
    collections::{BTreeMap, HashSet},
    path::{Component, Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
#[cfg(feature = "s3-storage")]
use tracing::error;
use tracing::{debug, info, instrument};

#[cfg(feature = "s3-storage")]
use crate::config::S3StorageConfig;
use crate::config::{BlobStorageBackend, BlobStorageConfig, FilesystemStorageConfig};

/// Errors that can occur during blob storage operations.
#[derive(Debug, Error)]
pub enum BlobStorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(String),

    #[error("Invalid blob path: {0}")]
    InvalidPath(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type BlobStorageResult<T> = Result<T, BlobStorageError>;

/// One stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobObject {
    /// Full logical path, e.g. `1/i1/<doc-hash>/h1/content.txt`.
    pub name: String,
    pub size_bytes: Option<u64>,
}

impl BlobObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size_bytes: None,
        }
    }
}

/// Object store operations the scrubber relies on.
///
/// Implementations must be `Send + Sync` to support async contexts.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// List every object whose path starts with `prefix`.
    async fn list_objects(&self, prefix: &str) -> BlobStorageResult<Vec<BlobObject>>;

    /// Delete one object. Deleting an object that no longer exists succeeds.
    async fn delete_object(&self, object: &BlobObject) -> BlobStorageResult<()>;

    /// Get the backend type name (for logging/debugging).
    fn backend_name(&self) -> &'static str;
}

// ─────────────────────────────────────────────────────────────────────────────
// Filesystem
// ─────────────────────────────────────────────────────────────────────────────

/// Filesystem blob storage backend.
///
/// Blob `a/b/c` is the file `{root}/a/b/c`.
pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new(config: FilesystemStorageConfig) -> BlobStorageResult<Self> {
        let root = PathBuf::from(&config.path);
        if !root.is_dir() {
            return Err(BlobStorageError::Config(format!(
                "Filesystem blob root '{}' is not a directory",
                config.path
            )));
        }
        Ok(Self { root })
    }

    /// Join a logical path onto the root, refusing anything that could escape it.
    fn resolve(&self, logical: &str) -> BlobStorageResult<PathBuf> {
        let relative = Path::new(logical);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(BlobStorageError::InvalidPath(logical.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Logical `/`-separated name of a file under the root.
    fn logical_name(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        Some(parts.join("/"))
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    #[instrument(skip(self))]
    async fn list_objects(&self, prefix: &str) -> BlobStorageResult<Vec<BlobObject>> {
        // Walk the deepest directory fully named by the prefix, then filter on
        // the full prefix for any trailing partial segment.
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let start = if dir_part.is_empty() {
            self.root.clone()
        } else {
            self.resolve(dir_part)?
        };

        let mut objects = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(BlobStorageError::Io(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file()
                    && let Some(name) = self.logical_name(&path)
                    && name.starts_with(prefix)
                {
                    let size_bytes = entry.metadata().await.ok().map(|m| m.len());
                    objects.push(BlobObject { name, size_bytes });
                }
            }
        }

        objects.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(prefix, count = objects.len(), "Listed blobs on filesystem");
        Ok(objects)
    }

    #[instrument(skip(self), fields(name = %object.name))]
    async fn delete_object(&self, object: &BlobObject) -> BlobStorageResult<()> {
        let path = self.resolve(&object.name)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Blob deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Blob already gone");
                Ok(())
            }
            Err(e) => Err(BlobStorageError::Io(e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// S3
// ─────────────────────────────────────────────────────────────────────────────

/// S3-compatible object storage backend.
///
/// Supports AWS S3, MinIO, Cloudflare R2, and other S3-compatible services.
/// Requires the `s3-storage` feature.
#[cfg(feature = "s3-storage")]
pub struct S3BlobStore {
    config: S3StorageConfig,
    client: aws_sdk_s3::Client,
}

#[cfg(feature = "s3-storage")]
impl S3BlobStore {
    pub async fn new(config: S3StorageConfig) -> BlobStorageResult<Self> {
        info!(bucket = %config.bucket, "Initializing S3 blob storage");

        let mut sdk_config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest());

        if let Some(region) = &config.region {
            sdk_config_builder = sdk_config_builder.region(aws_config::Region::new(region.clone()));
        }

        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = aws_credential_types::Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None, // session token
                None, // expiry
                "docscrub-config",
            );
            sdk_config_builder = sdk_config_builder.credentials_provider(credentials);
        }

        let sdk_config = sdk_config_builder.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = aws_sdk_s3::Client::from_conf(s3_config_builder.build());

        Ok(Self { config, client })
    }
}

#[cfg(feature = "s3-storage")]
#[async_trait]
impl BlobStore for S3BlobStore {
    #[instrument(skip(self), fields(bucket = %self.config.bucket))]
    async fn list_objects(&self, prefix: &str) -> BlobStorageResult<Vec<BlobObject>> {
        let key_prefix = self.config.object_key(prefix);
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.config.bucket)
                .prefix(&key_prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to list S3 objects");
                    BlobStorageError::S3(e.to_string())
                })?;

            for object in page.contents() {
                let Some(name) = object.key().and_then(|key| self.config.blob_path(key)) else {
                    continue;
                };
                objects.push(BlobObject {
                    name: name.to_string(),
                    size_bytes: object.size().and_then(|s| u64::try_from(s).ok()),
                });
            }

            match (page.is_truncated(), page.next_continuation_token()) {
                (Some(true), Some(token)) => continuation = Some(token.to_string()),
                _ => break,
            }
        }

        debug!(prefix = %key_prefix, count = objects.len(), "Listed blobs in S3");
        Ok(objects)
    }

    #[instrument(skip(self), fields(bucket = %self.config.bucket, name = %object.name))]
    async fn delete_object(&self, object: &BlobObject) -> BlobStorageResult<()> {
        let key = self.config.object_key(&object.name);

        // S3 answers 204 for absent keys, so deletes are idempotent as-is
        self.client
            .delete_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, key = %key, "Failed to delete from S3");
                BlobStorageError::S3(e.to_string())
            })?;

        debug!(key = %key, "Blob deleted from S3");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory blob store.
///
/// Counts calls and can be told to fail listings or deletes for specific
/// paths, which is what the scrub tests use to simulate a flaky store.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<String, Option<u64>>>,
    failing_deletes: Mutex<HashSet<String>>,
    failing_lists: Mutex<HashSet<String>>,
    list_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: impl Into<String>) {
        self.objects.lock().insert(name.into(), None);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.lock().contains_key(name)
    }

    /// Names of all stored objects, sorted.
    pub fn names(&self) -> Vec<String> {
        self.objects.lock().keys().cloned().collect()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::Relaxed)
    }

    /// Make deletes of `name` fail until [`Self::clear_failures`].
    pub fn fail_deletes_of(&self, name: impl Into<String>) {
        self.failing_deletes.lock().insert(name.into());
    }

    /// Make listings of exactly `prefix` fail until [`Self::clear_failures`].
    pub fn fail_listings_of(&self, prefix: impl Into<String>) {
        self.failing_lists.lock().insert(prefix.into());
    }

    pub fn clear_failures(&self) {
        self.failing_deletes.lock().clear();
        self.failing_lists.lock().clear();
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn list_objects(&self, prefix: &str) -> BlobStorageResult<Vec<BlobObject>> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        if self.failing_lists.lock().contains(prefix) {
            return Err(BlobStorageError::Unavailable(format!(
                "listing of '{prefix}' failed"
            )));
        }

        let objects = self.objects.lock();
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, size)| BlobObject {
                name: name.clone(),
                size_bytes: *size,
            })
            .collect())
    }

    async fn delete_object(&self, object: &BlobObject) -> BlobStorageResult<()> {
        self.delete_calls.fetch_add(1, Ordering::Relaxed);
        if self.failing_deletes.lock().contains(&object.name) {
            return Err(BlobStorageError::Unavailable(format!(
                "delete of '{}' failed",
                object.name
            )));
        }

        self.objects.lock().remove(&object.name);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

/// Create a blob storage backend from configuration.
pub async fn create_blob_store(
    config: &BlobStorageConfig,
) -> BlobStorageResult<Arc<dyn BlobStore>> {
    match config.backend {
        BlobStorageBackend::Filesystem => {
            let fs_config = config.filesystem.clone().ok_or_else(|| {
                BlobStorageError::Config(
                    "Filesystem backend requires [storage.blobs.filesystem] config".to_string(),
                )
            })?;
            info!(path = %fs_config.path, "Using filesystem blob storage backend");
            Ok(Arc::new(FilesystemBlobStore::new(fs_config)?))
        }
        #[cfg(feature = "s3-storage")]
        BlobStorageBackend::S3 => {
            let s3_config = config.s3.clone().ok_or_else(|| {
                BlobStorageError::Config(
                    "S3 backend requires [storage.blobs.s3] config".to_string(),
                )
            })?;
            info!(bucket = %s3_config.bucket, "Using S3 blob storage backend");
            Ok(Arc::new(S3BlobStore::new(s3_config).await?))
        }
        #[cfg(not(feature = "s3-storage"))]
        BlobStorageBackend::S3 => Err(BlobStorageError::Config(
            "S3 blob storage backend requires the 's3-storage' feature. \
                Rebuild with: cargo build --features s3-storage"
                .to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn fs_store(dir: &TempDir) -> FilesystemBlobStore {
        FilesystemBlobStore::new(FilesystemStorageConfig {
            path: dir.path().to_string_lossy().to_string(),
        })
        .unwrap()
    }

    async fn write_blob(dir: &TempDir, name: &str, content: &[u8]) {
        let path = dir.path().join(name);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, content).await.unwrap();
    }

    #[tokio::test]
    async fn test_filesystem_list_is_recursive_and_prefix_exact() {
        let dir = TempDir::new().unwrap();
        write_blob(&dir, "1/i1/abc/h1/content.txt", b"hello").await;
        write_blob(&dir, "1/i1/abc/h1/chunks/0.json", b"{}").await;
        write_blob(&dir, "1/i1/abc/h10/content.txt", b"other").await;
        write_blob(&dir, "1/i2/abc/h1/content.txt", b"other").await;

        let store = fs_store(&dir);
        let objects = store.list_objects("1/i1/abc/h1/").await.unwrap();

        let names: Vec<_> = objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["1/i1/abc/h1/chunks/0.json", "1/i1/abc/h1/content.txt"]
        );
        assert_eq!(objects[1].size_bytes, Some(5));
    }

    #[tokio::test]
    async fn test_filesystem_partial_segment_prefix() {
        let dir = TempDir::new().unwrap();
        write_blob(&dir, "1/i1/abc/h1/content.txt", b"a").await;
        write_blob(&dir, "1/i1/abc/h10/content.txt", b"b").await;

        let store = fs_store(&dir);
        let objects = store.list_objects("1/i1/abc/h1").await.unwrap();
        assert_eq!(objects.len(), 2);
    }

    #[tokio::test]
    async fn test_filesystem_list_missing_prefix_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = fs_store(&dir);

        let objects = store.list_objects("9/nope/abc/h1/").await.unwrap();
        assert!(objects.is_empty());
    }

    #[tokio::test]
    async fn test_filesystem_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        write_blob(&dir, "1/i1/abc/h1/content.txt", b"hello").await;
        let store = fs_store(&dir);
        let object = BlobObject::new("1/i1/abc/h1/content.txt");

        store.delete_object(&object).await.unwrap();
        assert!(!dir.path().join("1/i1/abc/h1/content.txt").exists());

        store.delete_object(&object).await.unwrap();
    }

    #[tokio::test]
    async fn test_filesystem_rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let store = fs_store(&dir);

        let result = store.delete_object(&BlobObject::new("../outside")).await;
        assert!(matches!(result, Err(BlobStorageError::InvalidPath(_))));

        let result = store.list_objects("/etc/").await;
        assert!(matches!(result, Err(BlobStorageError::InvalidPath(_))));
    }

    #[test]
    fn test_filesystem_root_must_exist() {
        let result = FilesystemBlobStore::new(FilesystemStorageConfig {
            path: "/definitely/not/a/real/dir".to_string(),
        });
        assert!(matches!(result, Err(BlobStorageError::Config(_))));
    }

    #[tokio::test]
    async fn test_memory_store_counts_and_injects_failures() {
        let store = MemoryBlobStore::new();
        store.insert("a/h1/x");
        store.insert("a/h1/y");
        store.insert("a/h10/x");

        let listed = store.list_objects("a/h1/").await.unwrap();
        assert_eq!(listed.len(), 2);

        store.fail_deletes_of("a/h1/x");
        assert!(store.delete_object(&listed[0]).await.is_err());
        store.delete_object(&listed[1]).await.unwrap();

        assert_eq!(store.delete_calls(), 2);
        assert!(!store.contains("a/h1/y"));
        assert!(store.contains("a/h1/x"));

        store.fail_listings_of("a/h10/");
        assert!(store.list_objects("a/h10/").await.is_err());
        store.clear_failures();
        assert_eq!(store.list_objects("a/h10/").await.unwrap().len(), 1);
        assert_eq!(store.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_create_blob_store_filesystem() {
        let dir = TempDir::new().unwrap();
        let config = BlobStorageConfig {
            backend: BlobStorageBackend::Filesystem,
            s3: None,
            filesystem: Some(FilesystemStorageConfig {
                path: dir.path().to_string_lossy().to_string(),
            }),
        };

        let store = create_blob_store(&config).await.unwrap();
        assert_eq!(store.backend_name(), "filesystem");
    }

    #[tokio::test]
    async fn test_create_blob_store_missing_section() {
        let config = BlobStorageConfig::default();
        let result = create_blob_store(&config).await;
        assert!(matches!(result, Err(BlobStorageError::Config(_))));
    }

    #[test]
    fn test_backends_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FilesystemBlobStore>();
        assert_send_sync::<MemoryBlobStore>();
        #[cfg(feature = "s3-storage")]
        assert_send_sync::<S3BlobStore>();
    }
}
