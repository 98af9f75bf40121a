use serde::{Deserialize, Serialize};

use crate::TransferParameters;
use crate::fetch_lock_name;

/// One multipart-upload part that has been accepted by the storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartTag {
    pub part_number: i32,
    pub etag: String,
}

/// Resumable state of an outbound transfer.
///
/// Created for chunk 1, emitted as the next invocation's input until
/// `complete`, at which point the send lock has been released and the chain
/// must not be re-invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendJob {
    #[serde(flatten)]
    pub params: TransferParameters,
    /// 1-based chunk counter.
    pub chunk_number: u32,
    /// Absolute byte offset consumed so far.
    pub current_byte_position: u64,
    pub complete: bool,
    /// Assigned by the transport when chunk 1 is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub lock_name: String,
    pub execution_id: String,
}

impl SendJob {
    /// First-chunk job for a freshly resolved transfer.
    pub fn first_chunk(params: TransferParameters, execution_id: impl Into<String>) -> Self {
        let lock_name = params.send_lock_name();
        Self {
            params,
            chunk_number: 1,
            current_byte_position: 0,
            complete: false,
            message_id: None,
            lock_name,
            execution_id: execution_id.into(),
        }
    }
}

/// Resumable state of an inbound transfer.
///
/// The destination and chunk count are unknown until the first chunk has been
/// retrieved; once learned they are frozen for the rest of the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchJob {
    pub message_id: String,
    pub dest_mailbox: String,
    /// 1-based chunk counter.
    pub chunk_num: u32,
    /// Declared by the transport on the first chunk; 0 until then.
    #[serde(default)]
    pub number_of_chunks: u32,
    pub complete: bool,
    /// Multipart-upload handle, present once a multipart upload was started.
    #[serde(rename = "aws_upload_id", default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    /// Next part number to upload, starting at 1.
    #[serde(rename = "aws_current_part_id", default = "default_part_number")]
    pub next_part_number: i32,
    /// Ordered, append-only list of uploaded part tags.
    #[serde(rename = "aws_part_etags", default, skip_serializing_if = "Vec::is_empty")]
    pub part_etags: Vec<PartTag>,
    /// Destination object, resolved on the first chunk and frozen.
    #[serde(rename = "s3_bucket", default, skip_serializing_if = "String::is_empty")]
    pub bucket: String,
    #[serde(rename = "s3_key", default, skip_serializing_if = "String::is_empty")]
    pub key: String,
    pub lock_name: String,
    pub execution_id: String,
}

fn default_part_number() -> i32 {
    1
}

impl FetchJob {
    /// Empty-cursor job for a newly listed message (chunk 1, nothing learned).
    pub fn first_chunk(
        message_id: impl Into<String>,
        dest_mailbox: impl Into<String>,
        execution_id: impl Into<String>,
    ) -> Self {
        let dest_mailbox = dest_mailbox.into();
        let lock_name = fetch_lock_name(&dest_mailbox);
        Self {
            message_id: message_id.into(),
            dest_mailbox,
            chunk_num: 1,
            number_of_chunks: 0,
            complete: false,
            upload_id: None,
            next_part_number: 1,
            part_etags: Vec::new(),
            bucket: String::new(),
            key: String::new(),
            lock_name,
            execution_id: execution_id.into(),
        }
    }
}
