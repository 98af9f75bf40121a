use std::collections::HashMap;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    DEFAULT_MIN_PART_SIZE, ObjectInfo, ObjectStore, PutRequest, StorageError, UploadedPart,
};

#[derive(Debug, Clone)]
struct StoredObject {
    body: Bytes,
    info: ObjectInfo,
}

#[derive(Debug, Default)]
struct PendingUpload {
    bucket: String,
    key: String,
    request: PutRequest,
    parts: HashMap<i32, Bytes>,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<(String, String), StoredObject>,
    uploads: HashMap<String, PendingUpload>,
    upload_seq: u64,
}

/// In-memory [`ObjectStore`] with real multipart semantics.
///
/// Parts are validated against `min_part_size` at completion time, the way
/// the real backend rejects undersized non-final parts.
pub struct MemoryObjectStore {
    inner: Mutex<Inner>,
    min_part_size: u64,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::with_min_part_size(DEFAULT_MIN_PART_SIZE)
    }

    /// Tests use a small minimum so multi-part flows stay readable.
    pub fn with_min_part_size(min_part_size: u64) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            min_part_size,
        }
    }

    /// Seeds an object directly, with full control over its attributes.
    pub async fn seed(&self, bucket: &str, key: &str, body: impl Into<Bytes>, info: ObjectInfo) {
        let body = body.into();
        let info = ObjectInfo {
            size: body.len() as u64,
            ..info
        };
        let mut inner = self.inner.lock().await;
        inner
            .objects
            .insert((bucket.to_string(), key.to_string()), StoredObject { body, info });
    }

    /// Full body of a stored object, for assertions.
    pub async fn object_bytes(&self, bucket: &str, key: &str) -> Option<Bytes> {
        let inner = self.inner.lock().await;
        inner
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.body.clone())
    }

    /// Number of multipart uploads still open.
    pub async fn open_uploads(&self) -> usize {
        self.inner.lock().await.uploads.len()
    }

    fn not_found(bucket: &str, key: &str) -> StorageError {
        StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

fn etag_of(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectInfo, StorageError> {
        let inner = self.inner.lock().await;
        inner
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.info.clone())
            .ok_or_else(|| Self::not_found(bucket, key))
    }

    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: u64,
    ) -> Result<Bytes, StorageError> {
        let inner = self.inner.lock().await;
        let object = inner
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| Self::not_found(bucket, key))?;
        let size = object.body.len() as u64;
        if start > end || end >= size {
            return Err(StorageError::InvalidRange { start, end, size });
        }
        Ok(object.body.slice(start as usize..=end as usize))
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        request: PutRequest,
    ) -> Result<(), StorageError> {
        let info = ObjectInfo {
            size: body.len() as u64,
            content_type: request
                .content_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            content_encoding: None,
            metadata: request.metadata,
        };
        debug!(bucket, key, size = info.size, "put object");
        let mut inner = self.inner.lock().await;
        inner
            .objects
            .insert((bucket.to_string(), key.to_string()), StoredObject { body, info });
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        request: PutRequest,
    ) -> Result<String, StorageError> {
        let mut inner = self.inner.lock().await;
        inner.upload_seq += 1;
        let upload_id = format!("upload-{:06}", inner.upload_seq);
        inner.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                request,
                parts: HashMap::new(),
            },
        );
        debug!(bucket, key, upload_id, "multipart upload created");
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<String, StorageError> {
        let mut inner = self.inner.lock().await;
        let upload = inner
            .uploads
            .get_mut(upload_id)
            .filter(|u| u.bucket == bucket && u.key == key)
            .ok_or_else(|| StorageError::NoSuchUpload {
                upload_id: upload_id.to_string(),
            })?;
        let etag = etag_of(&body);
        debug!(bucket, key, upload_id, part_number, size = body.len(), "part uploaded");
        upload.parts.insert(part_number, body);
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[UploadedPart],
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        let upload = inner
            .uploads
            .remove(upload_id)
            .filter(|u| u.bucket == bucket && u.key == key)
            .ok_or_else(|| StorageError::NoSuchUpload {
                upload_id: upload_id.to_string(),
            })?;

        let mut body = BytesMut::new();
        for (idx, part) in parts.iter().enumerate() {
            let data = upload.parts.get(&part.part_number).ok_or_else(|| {
                StorageError::Backend(format!("part {} was never uploaded", part.part_number))
            })?;
            if etag_of(data) != part.etag {
                return Err(StorageError::Backend(format!(
                    "etag mismatch for part {}",
                    part.part_number
                )));
            }
            let is_last = idx == parts.len() - 1;
            if !is_last && (data.len() as u64) < self.min_part_size {
                return Err(StorageError::PartTooSmall {
                    part_number: part.part_number,
                    size: data.len() as u64,
                    min: self.min_part_size,
                });
            }
            body.extend_from_slice(data);
        }

        let body = body.freeze();
        let info = ObjectInfo {
            size: body.len() as u64,
            content_type: upload
                .request
                .content_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            content_encoding: None,
            metadata: upload.request.metadata,
        };
        debug!(bucket, key, upload_id, size = info.size, "multipart upload completed");
        inner
            .objects
            .insert((bucket.to_string(), key.to_string()), StoredObject { body, info });
        Ok(())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        inner
            .uploads
            .remove(upload_id)
            .filter(|u| u.bucket == bucket && u.key == key)
            .ok_or_else(|| StorageError::NoSuchUpload {
                upload_id: upload_id.to_string(),
            })?;
        debug!(bucket, key, upload_id, "multipart upload aborted");
        Ok(())
    }
}
