//! Storage-facing services used by the scrub job.

pub mod blob_paths;
pub mod blob_storage;

pub use blob_paths::{document_id_hash, listing_prefix, resolve_blob_path};
pub use blob_storage::{
    BlobObject, BlobStorageError, BlobStorageResult, BlobStore, FilesystemBlobStore,
    MemoryBlobStore, create_blob_store,
};
#[cfg(feature = "s3-storage")]
pub use blob_storage::S3BlobStore;
