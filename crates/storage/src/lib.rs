//! Object-store operations the relay functions need.
//!
//! The concrete backend (and its wire format) lives behind [`ObjectStore`];
//! the relay only reads byte ranges, writes whole objects, and drives
//! multipart uploads. [`MemoryObjectStore`] is the in-memory backend used by
//! tests and sandbox runs.

mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;

pub use memory::MemoryObjectStore;

/// Minimum multipart part size most backends enforce (5 MiB).
///
/// Every part except the final one must be at least this large or the backend
/// rejects the upload at completion time.
pub const DEFAULT_MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Stored attributes of an object, as returned by a head request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectInfo {
    pub size: u64,
    pub content_type: String,
    pub content_encoding: Option<String>,
    /// User metadata, lower-cased keys.
    pub metadata: BTreeMap<String, String>,
}

/// Body, content type and user metadata for a write.
#[derive(Debug, Clone, Default)]
pub struct PutRequest {
    pub content_type: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// One accepted multipart part, in upload order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedPart {
    pub part_number: i32,
    pub etag: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    NotFound { bucket: String, key: String },

    #[error("no such multipart upload `{upload_id}`")]
    NoSuchUpload { upload_id: String },

    #[error("part {part_number} is {size} bytes, below the {min} byte minimum")]
    PartTooSmall {
        part_number: i32,
        size: u64,
        min: u64,
    },

    #[error("invalid byte range {start}-{end} for object of {size} bytes")]
    InvalidRange { start: u64, end: u64, size: u64 },

    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stored attributes of an object. Errors with `NotFound` if absent.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo, StorageError>;

    /// Reads the inclusive byte range `start..=end` of an object.
    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: u64,
    ) -> Result<Bytes, StorageError>;

    /// Writes a whole object with content type and user metadata.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        request: PutRequest,
    ) -> Result<(), StorageError>;

    /// Starts a multipart upload; returns the upload handle.
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        request: PutRequest,
    ) -> Result<String, StorageError>;

    /// Uploads one part; returns its etag. Part numbers start at 1.
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<String, StorageError>;

    /// Finalizes the upload from the ordered part list.
    ///
    /// Enforces the minimum-part-size rule: every listed part except the last
    /// must be at least the backend's minimum or the whole upload is refused.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> Result<(), StorageError>;

    /// Abandons the upload and discards its parts.
    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError>;
}
