use serde::{Deserialize, Serialize};

use crate::send_lock_name;

/// Complete parameter set for one outbound transfer.
///
/// Derived once — from object metadata or a routing lookup — and then carried
/// forward unchanged in every chunk job of that transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferParameters {
    pub bucket: String,
    pub key: String,
    pub sender: String,
    pub recipient: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    /// Tri-state: `None` means "no decision recorded", distinct from false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<String>,
    #[serde(default)]
    pub chunked: bool,
    #[serde(default = "default_total_chunks")]
    pub total_chunks: u32,
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

fn default_total_chunks() -> u32 {
    1
}

impl TransferParameters {
    /// Minimal parameter set with routing only; attributes filled in later.
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        workflow_id: Option<String>,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            sender: sender.into(),
            recipient: recipient.into(),
            workflow_id,
            filename: None,
            file_size: 0,
            content_type: default_content_type(),
            content_encoding: None,
            compress: None,
            compressed: None,
            encrypted: None,
            checksum: None,
            local_id: None,
            subject: None,
            partner_id: None,
            chunked: false,
            total_chunks: 1,
        }
    }

    /// Name of the lock serializing transfers of this source object.
    pub fn send_lock_name(&self) -> String {
        send_lock_name(&self.bucket, &self.key)
    }
}

/// Chunk count for a file: `ceil(file_size / chunk_size)`, minimum 1.
///
/// Returns `(chunked, total_chunks)`; a transfer is chunked only when it
/// needs more than one chunk. An empty file still counts as one chunk.
pub fn calculate_chunks(file_size: u64, chunk_size: u64) -> (bool, u32) {
    let chunks = file_size.div_ceil(chunk_size).max(1);
    (chunks > 1, chunks as u32)
}
