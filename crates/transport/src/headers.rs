use std::collections::BTreeMap;

use courier_protocol::{MessageType, meta};
use serde::{Deserialize, Serialize};

/// Typed view of the per-message metadata headers the transport returns with
/// every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageHeaders {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<String>,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_success: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Declared `(current, total)` chunk range; total is authoritative.
    #[serde(default = "default_chunk_range")]
    pub chunk_range: (u32, u32),
}

fn default_chunk_range() -> (u32, u32) {
    (1, 1)
}

impl MessageHeaders {
    /// Total chunk count the transport declared for this message.
    pub fn total_chunks(&self) -> u32 {
        self.chunk_range.1.max(1)
    }

    /// Content type, defaulted the way the transport does.
    pub fn content_type_or_default(&self) -> String {
        self.content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string())
    }

    /// Headers as object-store user metadata under the shared vocabulary.
    ///
    /// Only headers that are actually present are written; the destination
    /// object then self-describes its origin.
    pub fn to_object_metadata(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        let mut put = |key: &str, value: &Option<String>| {
            if let Some(v) = value {
                map.insert(key.to_string(), v.clone());
            }
        };
        put(meta::FROM, &self.sender);
        put(meta::TO, &self.recipient);
        put(meta::WORKFLOW_ID, &self.workflow_id);
        put(meta::FILENAME, &self.filename);
        put(meta::SUBJECT, &self.subject);
        put(meta::LOCAL_ID, &self.local_id);
        put(meta::PARTNER_ID, &self.partner_id);
        put(meta::STATUS_CODE, &self.status_code);
        put(meta::STATUS_DESCRIPTION, &self.status_description);
        put(meta::STATUS_SUCCESS, &self.status_success);
        put(meta::CONTENT_CHECKSUM, &self.checksum);
        map.insert(
            meta::MESSAGE_TYPE.to_string(),
            match self.message_type {
                MessageType::Report => "REPORT".to_string(),
                MessageType::Data => "DATA".to_string(),
            },
        );
        map
    }

    /// Serializes the headers as the JSON document stored for reports.
    pub fn to_report_document(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&self.to_object_metadata())
    }
}
