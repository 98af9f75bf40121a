//! Mailbox-transport operations the relay functions need.
//!
//! The store-and-forward network splits every message into transport-level
//! chunks; [`MailboxTransport`] exposes exactly the surface the state
//! machines drive: handshake, list, retrieve chunk, acknowledge, send chunk.
//! [`MemoryTransport`] is the in-memory network used by tests and sandbox
//! runs.

mod headers;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;

pub use headers::MessageHeaders;
pub use memory::{InboundMessage, MemoryTransport};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("message `{message_id}` no longer exists")]
    MessageGone { message_id: String },

    #[error("handshake failed for mailbox `{mailbox}`: {reason}")]
    HandshakeFailed { mailbox: String, reason: String },

    #[error("unknown mailbox `{mailbox}`")]
    UnknownMailbox { mailbox: String },

    #[error("transport error: {0}")]
    Backend(String),
}

/// One retrieved chunk of an inbound message.
#[derive(Debug, Clone)]
pub struct ChunkDownload {
    pub body: Bytes,
    /// Per-message metadata headers; `chunk_range` declares the total count.
    pub headers: MessageHeaders,
}

/// One outbound chunk submission.
#[derive(Debug, Clone)]
pub struct OutboundChunk {
    /// Sending mailbox.
    pub sender: String,
    /// Running message id; `None` only on the first chunk.
    pub message_id: Option<String>,
    pub chunk_number: u32,
    pub total_chunks: u32,
    pub recipient: String,
    pub workflow_id: Option<String>,
    pub filename: Option<String>,
    pub subject: Option<String>,
    pub local_id: Option<String>,
    pub partner_id: Option<String>,
    pub checksum: Option<String>,
    pub compress: Option<bool>,
    pub compressed: Option<bool>,
    pub encrypted: Option<bool>,
    pub content_type: String,
    pub body: Bytes,
}

#[async_trait]
pub trait MailboxTransport: Send + Sync {
    /// Authenticated handshake; succeeds quietly or fails with context.
    async fn handshake(&self, mailbox: &str) -> Result<(), TransportError>;

    /// Ids of pending messages, following transport paging up to `limit`.
    async fn list_messages(&self, mailbox: &str, limit: usize)
    -> Result<Vec<String>, TransportError>;

    /// Retrieves one chunk of a message. Chunk numbers are 1-based.
    async fn retrieve_chunk(
        &self,
        mailbox: &str,
        message_id: &str,
        chunk_num: u32,
    ) -> Result<ChunkDownload, TransportError>;

    /// Marks the message consumed so it stops being listed.
    async fn acknowledge(&self, mailbox: &str, message_id: &str) -> Result<(), TransportError>;

    /// Submits one outbound chunk; returns the message id, assigned by the
    /// transport when the first chunk is accepted.
    async fn send_chunk(&self, chunk: OutboundChunk) -> Result<String, TransportError>;
}
