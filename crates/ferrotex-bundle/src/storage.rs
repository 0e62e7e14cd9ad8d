//! Blob store abstraction.
//!
//! ## Overview
//!
//! Bundles, bibliographies and figure assets live in an object store addressed
//! by `(bucket, key)`. The engine only depends on the [`BlobStore`] trait so the
//! hosting service can plug in its own client:
//!
//! ```text
//! ┌────────────────┐
//! │ BundleService  │
//! └───────┬────────┘
//!         │ Arc<dyn BlobStore>
//!         ▼
//! ┌────────────────┐
//! │   BlobStore    │
//! │    (trait)     │
//! └───────┬────────┘
//!    ┌────┴─────────────┐
//!    │                  │
//! MemoryBlobStore   FsBlobStore
//! ```
//!
//! [`BucketGuard`] makes sure a bucket exists exactly once per guard, even when
//! the first calls race.

use once_cell::sync::OnceCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("bucket already exists: {0}")]
    BucketAlreadyExists(String),

    #[error("object already exists: {bucket}/{key}")]
    AlreadyExists { bucket: String, key: String },

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketOptions {
    pub public: bool,
}

/// Object storage used by the engine.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one store is shared by every request.
pub trait BlobStore: std::fmt::Debug + Send + Sync {
    /// Reads a whole object.
    fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Writes an object. Without `upsert`, an existing object is an
    /// [`StorageError::AlreadyExists`] error.
    fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        upsert: bool,
    ) -> Result<(), StorageError>;

    fn bucket_exists(&self, name: &str) -> Result<bool, StorageError>;

    /// Creates a bucket. Fails with [`StorageError::BucketAlreadyExists`] if present.
    fn create_bucket(&self, name: &str, options: BucketOptions) -> Result<(), StorageError>;
}

/// One-time "bucket exists" initialisation.
///
/// A failed attempt is not remembered; the next call tries again.
#[derive(Debug)]
pub struct BucketGuard {
    bucket: String,
    options: BucketOptions,
    ready: OnceCell<()>,
}

impl BucketGuard {
    pub fn new(bucket: impl Into<String>, options: BucketOptions) -> Self {
        Self {
            bucket: bucket.into(),
            options,
            ready: OnceCell::new(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get().is_some()
    }

    pub fn ensure(&self, store: &dyn BlobStore) -> Result<(), StorageError> {
        self.ready
            .get_or_try_init(|| {
                if store.bucket_exists(&self.bucket)? {
                    return Ok(());
                }
                match store.create_bucket(&self.bucket, self.options) {
                    Ok(()) => {
                        log::info!("Created bucket {}", self.bucket);
                        Ok(())
                    }
                    // Someone else won the race.
                    Err(StorageError::BucketAlreadyExists(_)) => Ok(()),
                    Err(e) => Err(e),
                }
            })
            .map(|_| ())
    }
}

/// In-memory store for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    buckets: RwLock<HashSet<String>>,
    objects: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for seeding: creates the bucket if needed and overwrites the object.
    pub fn insert(&self, bucket: &str, key: &str, bytes: impl Into<Vec<u8>>) {
        if let Ok(mut buckets) = self.buckets.write() {
            buckets.insert(bucket.to_string());
        }
        if let Ok(mut objects) = self.objects.write() {
            objects.insert((bucket.to_string(), key.to_string()), bytes.into());
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StorageError {
    StorageError::Backend("lock poisoned".into())
}

impl BlobStore for MemoryBlobStore {
    fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
        upsert: bool,
    ) -> Result<(), StorageError> {
        if !self.bucket_exists(bucket)? {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        let id = (bucket.to_string(), key.to_string());
        if !upsert && objects.contains_key(&id) {
            return Err(StorageError::AlreadyExists {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        objects.insert(id, bytes.to_vec());
        Ok(())
    }

    fn bucket_exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.buckets.read().map_err(|_| poisoned())?.contains(name))
    }

    fn create_bucket(&self, name: &str, _options: BucketOptions) -> Result<(), StorageError> {
        let mut buckets = self.buckets.write().map_err(|_| poisoned())?;
        if !buckets.insert(name.to_string()) {
            return Err(StorageError::BucketAlreadyExists(name.to_string()));
        }
        Ok(())
    }
}

/// Directory-backed store: each bucket is a sub-directory of `root` and each
/// key a relative file path inside it.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket.contains("..") {
            return Err(StorageError::InvalidKey(bucket.to_string()));
        }
        Ok(self.root.join(bucket))
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let relative = key.trim_start_matches('/');
        if relative.is_empty() || relative.split(['/', '\\']).any(|s| s == "..") {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.bucket_dir(bucket)?.join(relative))
    }
}

impl BlobStore for FsBlobStore {
    fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(bucket, key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn upload(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
        upsert: bool,
    ) -> Result<(), StorageError> {
        if !self.bucket_exists(bucket)? {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }
        let path = self.object_path(bucket, key)?;
        if !upsert && path.exists() {
            return Err(StorageError::AlreadyExists {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        Ok(())
    }

    fn bucket_exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.bucket_dir(name)?.is_dir())
    }

    fn create_bucket(&self, name: &str, _options: BucketOptions) -> Result<(), StorageError> {
        let dir = self.bucket_dir(name)?;
        if dir.is_dir() {
            return Err(StorageError::BucketAlreadyExists(name.to_string()));
        }
        std::fs::create_dir_all(&dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryBlobStore::new();
        store.create_bucket("b", BucketOptions::default()).unwrap();
        store.upload("b", "k", b"v", "text/plain", false).unwrap();
        assert_eq!(store.download("b", "k").unwrap(), b"v");

        let err = store.upload("b", "k", b"w", "text/plain", false).unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
        store.upload("b", "k", b"w", "text/plain", true).unwrap();
        assert_eq!(store.download("b", "k").unwrap(), b"w");

        assert!(matches!(
            store.download("b", "missing"),
            Err(StorageError::NotFound { .. })
        ));
        assert!(matches!(
            store.upload("nope", "k", b"", "text/plain", true),
            Err(StorageError::BucketNotFound(_))
        ));
    }

    #[test]
    fn test_fs_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(!store.bucket_exists("b").unwrap());
        store.create_bucket("b", BucketOptions::default()).unwrap();
        assert!(matches!(
            store.create_bucket("b", BucketOptions::default()),
            Err(StorageError::BucketAlreadyExists(_))
        ));

        store
            .upload("b", "nested/dir/file.tex", b"\\relax", "text/x-tex", false)
            .unwrap();
        assert_eq!(store.download("b", "nested/dir/file.tex").unwrap(), b"\\relax");
        assert!(dir.path().join("b/nested/dir/file.tex").exists());
        assert!(matches!(
            store.download("b", "nested/other.tex"),
            Err(StorageError::NotFound { .. })
        ));
    }

    #[test]
    fn test_fs_store_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(matches!(
            store.download("b", "../../etc/passwd"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            store.download("..", "x"),
            Err(StorageError::InvalidKey(_))
        ));
    }

    /// Counts create calls and fails the first `bucket_exists` if asked to.
    #[derive(Debug, Default)]
    struct CountingStore {
        inner: MemoryBlobStore,
        creates: AtomicUsize,
        fail_next_check: std::sync::atomic::AtomicBool,
    }

    impl BlobStore for CountingStore {
        fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StorageError> {
            self.inner.download(bucket, key)
        }
        fn upload(
            &self,
            bucket: &str,
            key: &str,
            bytes: &[u8],
            content_type: &str,
            upsert: bool,
        ) -> Result<(), StorageError> {
            self.inner.upload(bucket, key, bytes, content_type, upsert)
        }
        fn bucket_exists(&self, name: &str) -> Result<bool, StorageError> {
            if self.fail_next_check.swap(false, Ordering::SeqCst) {
                return Err(StorageError::Backend("unavailable".into()));
            }
            self.inner.bucket_exists(name)
        }
        fn create_bucket(&self, name: &str, options: BucketOptions) -> Result<(), StorageError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.inner.create_bucket(name, options)
        }
    }

    #[test]
    fn test_bucket_guard_creates_once_across_threads() {
        let store = Arc::new(CountingStore::default());
        let guard = Arc::new(BucketGuard::new("shared", BucketOptions { public: false }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let guard = Arc::clone(&guard);
                std::thread::spawn(move || guard.ensure(store.as_ref()).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(guard.is_ready());
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
        assert!(store.bucket_exists("shared").unwrap());
    }

    #[test]
    fn test_bucket_guard_tolerates_existing_bucket() {
        let store = CountingStore::default();
        store
            .inner
            .create_bucket("pre", BucketOptions::default())
            .unwrap();
        let guard = BucketGuard::new("pre", BucketOptions::default());
        guard.ensure(&store).unwrap();
        assert_eq!(store.creates.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_bucket_guard_retries_after_failure() {
        let store = CountingStore::default();
        store.fail_next_check.store(true, Ordering::SeqCst);
        let guard = BucketGuard::new("later", BucketOptions::default());

        assert!(guard.ensure(&store).is_err());
        assert!(!guard.is_ready());

        guard.ensure(&store).unwrap();
        assert!(guard.is_ready());
    }
}
