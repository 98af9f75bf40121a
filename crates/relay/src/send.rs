use std::sync::Arc;

use bytes::BytesMut;
use courier_lock::{DistributedLock, Hold};
use courier_protocol::SendJob;
use courier_storage::{ObjectStore, StorageError};
use courier_transport::{MailboxTransport, OutboundChunk};
use tracing::info;

use crate::{RelayConfig, RelayError};

/// One-step-per-invocation sender.
///
/// Each `run` moves exactly one chunk of the source object into the mailbox
/// network and returns the job for the next invocation. The send lock is
/// acquired on every step and held across steps of the same chain; it is
/// released when the transfer completes or fails.
pub struct SendChunkTask {
    store: Arc<dyn ObjectStore>,
    transport: Arc<dyn MailboxTransport>,
    lock: DistributedLock,
    config: RelayConfig,
}

impl SendChunkTask {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        transport: Arc<dyn MailboxTransport>,
        lock: DistributedLock,
        config: RelayConfig,
    ) -> Self {
        Self {
            store,
            transport,
            lock,
            config,
        }
    }

    pub async fn run(&self, job: SendJob) -> Result<SendJob, RelayError> {
        if job.complete {
            return Err(RelayError::AlreadyComplete {
                context: job.lock_name,
            });
        }
        let lock_name = job.lock_name.clone();
        let owner = job.execution_id.clone();
        self.lock.with_lock(&lock_name, &owner, self.advance(job)).await
    }

    async fn advance(&self, mut job: SendJob) -> Result<(SendJob, Hold), RelayError> {
        let bucket = job.params.bucket.clone();
        let key = job.params.key.clone();

        let info = match self.store.head_object(&bucket, &key).await {
            Ok(info) => info,
            Err(StorageError::NotFound { .. }) => {
                return Err(RelayError::SourceNotFound { bucket, key });
            }
            Err(err) => return Err(err.into()),
        };
        // A zero-byte object has nothing to relay.
        if info.size == 0 {
            return Err(RelayError::SourceNotFound { bucket, key });
        }
        // The cursor must still point inside the object; anything past the
        // end means the continuation payload or the object itself changed.
        if job.current_byte_position >= info.size {
            return Err(RelayError::MaxBytesExceeded {
                key,
                chunk_number: job.chunk_number,
                total_chunks: job.params.total_chunks,
            });
        }

        let start = job.current_byte_position;
        let end = (start + self.config.chunk_size).min(info.size);
        let mut body = BytesMut::with_capacity((end - start) as usize);
        let mut pos = start;
        while pos < end {
            let crumb_end = (pos + self.config.crumb_size).min(end);
            let crumb = self.store.get_range(&bucket, &key, pos, crumb_end - 1).await?;
            body.extend_from_slice(&crumb);
            pos = crumb_end;
        }

        let params = &job.params;
        let chunk = OutboundChunk {
            sender: params.sender.clone(),
            message_id: job.message_id.clone(),
            chunk_number: job.chunk_number,
            total_chunks: params.total_chunks,
            recipient: params.recipient.clone(),
            workflow_id: params.workflow_id.clone(),
            filename: params.filename.clone(),
            subject: params.subject.clone(),
            local_id: params.local_id.clone(),
            partner_id: params.partner_id.clone(),
            checksum: params.checksum.clone(),
            compress: params.compress,
            compressed: params.compressed,
            encrypted: params.encrypted,
            content_type: params.content_type.clone(),
            body: body.freeze(),
        };
        let message_id = self.transport.send_chunk(chunk).await?;
        if job.message_id.is_none() {
            job.message_id = Some(message_id.clone());
        }
        job.current_byte_position = end;

        let finished = if params.chunked {
            job.chunk_number >= params.total_chunks
        } else {
            true
        };
        // Bytes left over after the last planned chunk means the object grew
        // mid-transfer; truncating it silently is worse than failing.
        if finished && end < info.size {
            return Err(RelayError::MaxBytesExceeded {
                key,
                chunk_number: job.chunk_number,
                total_chunks: params.total_chunks,
            });
        }
        info!(
            bucket,
            key,
            message_id,
            chunk_number = job.chunk_number,
            total_chunks = params.total_chunks,
            bytes_sent = end - start,
            finished,
            "chunk relayed"
        );
        if finished {
            job.complete = true;
            Ok((job, Hold::Release))
        } else {
            job.chunk_number += 1;
            Ok((job, Hold::Keep))
        }
    }
}
