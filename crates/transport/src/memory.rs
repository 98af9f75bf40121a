use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{ChunkDownload, MailboxTransport, MessageHeaders, OutboundChunk, TransportError};

/// One seeded inbound message, pre-split into transport chunks.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: String,
    pub chunks: Vec<Bytes>,
    pub headers: MessageHeaders,
}

#[derive(Default)]
struct MailboxState {
    inbound: Vec<InboundMessage>,
    ack_counts: HashMap<String, u32>,
}

#[derive(Default)]
struct Inner {
    mailboxes: HashMap<String, MailboxState>,
    handshake_denied: Vec<String>,
    outbound: Vec<OutboundChunk>,
    message_seq: u64,
}

/// In-memory mailbox network for tests and sandbox runs.
///
/// `list_messages` pages through pending ids internally the way a real
/// transport hands out continuation cues.
pub struct MemoryTransport {
    inner: Mutex<Inner>,
    page_size: usize,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::with_page_size(10)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            page_size: page_size.max(1),
        }
    }

    /// Queues an inbound message for a mailbox.
    pub async fn seed_message(&self, mailbox: &str, message: InboundMessage) {
        let mut inner = self.inner.lock().await;
        inner
            .mailboxes
            .entry(mailbox.to_string())
            .or_default()
            .inbound
            .push(message);
    }

    /// Makes subsequent handshakes for a mailbox fail.
    pub async fn deny_handshake(&self, mailbox: &str) {
        self.inner.lock().await.handshake_denied.push(mailbox.to_string());
    }

    /// How many times a message has been acknowledged.
    pub async fn ack_count(&self, mailbox: &str, message_id: &str) -> u32 {
        let inner = self.inner.lock().await;
        inner
            .mailboxes
            .get(mailbox)
            .and_then(|m| m.ack_counts.get(message_id).copied())
            .unwrap_or(0)
    }

    /// Every outbound chunk accepted so far, in submission order.
    pub async fn outbound_chunks(&self) -> Vec<OutboundChunk> {
        self.inner.lock().await.outbound.clone()
    }

    /// Concatenated payload of all chunks submitted under one message id.
    pub async fn outbound_message_bytes(&self, message_id: &str) -> Vec<u8> {
        let inner = self.inner.lock().await;
        let mut out = Vec::new();
        for chunk in &inner.outbound {
            if chunk.message_id.as_deref() == Some(message_id) {
                out.extend_from_slice(&chunk.body);
            }
        }
        out
    }

    fn message_gone(message_id: &str) -> TransportError {
        TransportError::MessageGone {
            message_id: message_id.to_string(),
        }
    }
}

#[async_trait]
impl MailboxTransport for MemoryTransport {
    async fn handshake(&self, mailbox: &str) -> Result<(), TransportError> {
        let inner = self.inner.lock().await;
        if inner.handshake_denied.iter().any(|m| m == mailbox) {
            return Err(TransportError::HandshakeFailed {
                mailbox: mailbox.to_string(),
                reason: "authentication rejected".to_string(),
            });
        }
        debug!(mailbox, "handshake ok");
        Ok(())
    }

    async fn list_messages(
        &self,
        mailbox: &str,
        limit: usize,
    ) -> Result<Vec<String>, TransportError> {
        let inner = self.inner.lock().await;
        let state = match inner.mailboxes.get(mailbox) {
            Some(state) => state,
            None => return Ok(Vec::new()),
        };
        let pending: Vec<&str> = state
            .inbound
            .iter()
            .filter(|m| !state.ack_counts.contains_key(&m.id))
            .map(|m| m.id.as_str())
            .collect();

        // Follow the paging cursor until the limit or the end of the list.
        let mut ids = Vec::new();
        let mut cursor = 0;
        while cursor < pending.len() && ids.len() < limit {
            let page = &pending[cursor..(cursor + self.page_size).min(pending.len())];
            for id in page {
                if ids.len() == limit {
                    break;
                }
                ids.push(id.to_string());
            }
            cursor += self.page_size;
        }
        debug!(mailbox, count = ids.len(), "listed pending messages");
        Ok(ids)
    }

    async fn retrieve_chunk(
        &self,
        mailbox: &str,
        message_id: &str,
        chunk_num: u32,
    ) -> Result<ChunkDownload, TransportError> {
        let inner = self.inner.lock().await;
        let state = inner
            .mailboxes
            .get(mailbox)
            .ok_or_else(|| TransportError::UnknownMailbox {
                mailbox: mailbox.to_string(),
            })?;
        if state.ack_counts.contains_key(message_id) {
            return Err(Self::message_gone(message_id));
        }
        let message = state
            .inbound
            .iter()
            .find(|m| m.id == message_id)
            .ok_or_else(|| Self::message_gone(message_id))?;

        let total = message.chunks.len() as u32;
        if chunk_num == 0 || chunk_num > total {
            return Err(TransportError::Backend(format!(
                "chunk {chunk_num} out of range 1..={total} for message {message_id}"
            )));
        }
        let mut headers = message.headers.clone();
        headers.chunk_range = (chunk_num, total);
        Ok(ChunkDownload {
            body: message.chunks[(chunk_num - 1) as usize].clone(),
            headers,
        })
    }

    async fn acknowledge(&self, mailbox: &str, message_id: &str) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().await;
        let state = inner
            .mailboxes
            .get_mut(mailbox)
            .ok_or_else(|| TransportError::UnknownMailbox {
                mailbox: mailbox.to_string(),
            })?;
        if !state.inbound.iter().any(|m| m.id == message_id) {
            return Err(Self::message_gone(message_id));
        }
        *state.ack_counts.entry(message_id.to_string()).or_insert(0) += 1;
        debug!(mailbox, message_id, "message acknowledged");
        Ok(())
    }

    async fn send_chunk(&self, chunk: OutboundChunk) -> Result<String, TransportError> {
        let mut inner = self.inner.lock().await;
        let message_id = match &chunk.message_id {
            Some(id) => id.clone(),
            None => {
                inner.message_seq += 1;
                format!("msg-{:06}", inner.message_seq)
            }
        };
        debug!(
            sender = chunk.sender,
            recipient = chunk.recipient,
            message_id,
            chunk_number = chunk.chunk_number,
            total_chunks = chunk.total_chunks,
            size = chunk.body.len(),
            "outbound chunk accepted"
        );
        let mut recorded = chunk;
        recorded.message_id = Some(message_id.clone());
        inner.outbound.push(recorded);
        Ok(message_id)
    }
}
