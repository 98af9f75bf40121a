use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use courier_lock::{DistributedLock, Hold};
use courier_protocol::{FetchJob, MessageType, PartTag};
use courier_storage::{ObjectStore, PutRequest, UploadedPart};
use courier_transport::{MailboxTransport, MessageHeaders};
use tracing::{error, info};

use crate::{RelayConfig, RelayError, RouteLookup};

/// How an inbound message is written back to the object store.
enum MessageKind {
    /// Delivery report: its headers become a small JSON control document.
    Report,
    /// Fits in one transport chunk; written with a plain put.
    SingleChunk,
    /// Spans transport chunks; streamed through a multipart upload.
    MultiChunk,
}

impl MessageKind {
    fn of(headers: &MessageHeaders, number_of_chunks: u32) -> Self {
        if headers.message_type == MessageType::Report {
            MessageKind::Report
        } else if number_of_chunks <= 1 {
            MessageKind::SingleChunk
        } else {
            MessageKind::MultiChunk
        }
    }
}

/// One-step-per-invocation fetcher.
///
/// Each `run` retrieves transport chunks of one message — accumulating until
/// it has a full storage part or the final chunk — writes them out, and
/// returns the job for the next invocation. The message is acknowledged only
/// after its destination object is durably complete.
pub struct FetchChunkTask {
    store: Arc<dyn ObjectStore>,
    transport: Arc<dyn MailboxTransport>,
    lock: DistributedLock,
    routes: Arc<dyn RouteLookup>,
    config: RelayConfig,
}

impl FetchChunkTask {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        transport: Arc<dyn MailboxTransport>,
        lock: DistributedLock,
        routes: Arc<dyn RouteLookup>,
        config: RelayConfig,
    ) -> Self {
        Self {
            store,
            transport,
            lock,
            routes,
            config,
        }
    }

    pub async fn run(&self, job: FetchJob) -> Result<FetchJob, RelayError> {
        if job.complete {
            return Err(RelayError::AlreadyComplete {
                context: format!("{} message {}", job.lock_name, job.message_id),
            });
        }
        let lock_name = job.lock_name.clone();
        let owner = job.execution_id.clone();
        self.lock.with_lock(&lock_name, &owner, self.advance(job)).await
    }

    async fn advance(&self, mut job: FetchJob) -> Result<(FetchJob, Hold), RelayError> {
        let download = self
            .transport
            .retrieve_chunk(&job.dest_mailbox, &job.message_id, job.chunk_num)
            .await?;
        let headers = download.headers.clone();
        // The transport's declared count is authoritative and frozen from the
        // first chunk onward.
        if job.number_of_chunks == 0 {
            job.number_of_chunks = headers.total_chunks();
        }
        let kind = MessageKind::of(&headers, job.number_of_chunks);

        if job.bucket.is_empty() {
            let location = self.routes.inbound_location(&job.dest_mailbox).await?;
            let filename = self.destination_filename(&job, &headers, &kind);
            job.key = location.key_for(&job.dest_mailbox, &filename);
            job.bucket = location.bucket;
        }

        match kind {
            MessageKind::Report => self.store_report(job, &headers).await,
            MessageKind::SingleChunk => self.store_single(job, &headers, download.body).await,
            MessageKind::MultiChunk => self.store_part(job, &headers, download.body).await,
        }
    }

    fn destination_filename(
        &self,
        job: &FetchJob,
        headers: &MessageHeaders,
        kind: &MessageKind,
    ) -> String {
        if matches!(kind, MessageKind::Report) {
            return format!("{}.ctl", job.message_id);
        }
        if self.config.use_sender_filename {
            if let Some(name) = headers.filename.as_deref().map(str::trim) {
                if !name.is_empty() {
                    return name.to_string();
                }
            }
        }
        format!("{}.dat", job.message_id)
    }

    async fn store_report(
        &self,
        mut job: FetchJob,
        headers: &MessageHeaders,
    ) -> Result<(FetchJob, Hold), RelayError> {
        let document = headers.to_report_document()?;
        self.store
            .put_object(
                &job.bucket,
                &job.key,
                Bytes::from(document),
                PutRequest {
                    content_type: Some("application/json".to_string()),
                    metadata: headers.to_object_metadata(),
                },
            )
            .await?;
        self.acknowledge(&job).await?;
        info!(
            message_id = job.message_id,
            bucket = job.bucket,
            key = job.key,
            "report stored"
        );
        job.complete = true;
        Ok((job, Hold::Release))
    }

    async fn store_single(
        &self,
        mut job: FetchJob,
        headers: &MessageHeaders,
        body: Bytes,
    ) -> Result<(FetchJob, Hold), RelayError> {
        let size = body.len();
        self.store
            .put_object(
                &job.bucket,
                &job.key,
                body,
                PutRequest {
                    content_type: Some(headers.content_type_or_default()),
                    metadata: headers.to_object_metadata(),
                },
            )
            .await?;
        self.acknowledge(&job).await?;
        info!(
            message_id = job.message_id,
            bucket = job.bucket,
            key = job.key,
            size,
            "message stored"
        );
        job.complete = true;
        Ok((job, Hold::Release))
    }

    async fn store_part(
        &self,
        mut job: FetchJob,
        headers: &MessageHeaders,
        first_body: Bytes,
    ) -> Result<(FetchJob, Hold), RelayError> {
        let upload_id = match &job.upload_id {
            Some(id) => id.clone(),
            None if job.chunk_num == 1 => {
                let request = PutRequest {
                    content_type: Some(headers.content_type_or_default()),
                    metadata: headers.to_object_metadata(),
                };
                let id = match self
                    .store
                    .create_multipart_upload(&job.bucket, &job.key, request)
                    .await
                {
                    Ok(id) => id,
                    Err(err) => {
                        error!(
                            message_id = job.message_id,
                            bucket = job.bucket,
                            key = job.key,
                            %err,
                            "failed to start multipart upload"
                        );
                        return Err(err.into());
                    }
                };
                job.upload_id = Some(id.clone());
                id
            }
            None => {
                return Err(RelayError::InvalidContinuation {
                    reason: format!(
                        "chunk {} of message {} arrived without an upload handle",
                        job.chunk_num, job.message_id
                    ),
                });
            }
        };

        // Accumulate chunks until the buffer reaches the backend's minimum
        // part size or the final chunk is in hand; each invocation uploads
        // exactly one part.
        let mut buffer = BytesMut::from(&first_body[..]);
        while (buffer.len() as u64) < self.config.min_part_size
            && job.chunk_num < job.number_of_chunks
        {
            job.chunk_num += 1;
            let next = self
                .transport
                .retrieve_chunk(&job.dest_mailbox, &job.message_id, job.chunk_num)
                .await?;
            buffer.extend_from_slice(&next.body);
        }

        let part_size = buffer.len();
        let etag = self
            .store
            .upload_part(
                &job.bucket,
                &job.key,
                &upload_id,
                job.next_part_number,
                buffer.freeze(),
            )
            .await?;
        job.part_etags.push(PartTag {
            part_number: job.next_part_number,
            etag,
        });
        info!(
            message_id = job.message_id,
            upload_id,
            part_number = job.next_part_number,
            part_size,
            chunk_num = job.chunk_num,
            number_of_chunks = job.number_of_chunks,
            "part uploaded"
        );
        job.next_part_number += 1;

        if job.chunk_num >= job.number_of_chunks {
            let parts: Vec<UploadedPart> = job
                .part_etags
                .iter()
                .map(|p| UploadedPart {
                    part_number: p.part_number,
                    etag: p.etag.clone(),
                })
                .collect();
            if let Err(err) = self
                .store
                .complete_multipart_upload(&job.bucket, &job.key, &upload_id, &parts)
                .await
            {
                error!(
                    message_id = job.message_id,
                    upload_id,
                    %err,
                    "failed to complete multipart upload"
                );
                return Err(err.into());
            }
            self.acknowledge(&job).await?;
            info!(
                message_id = job.message_id,
                bucket = job.bucket,
                key = job.key,
                parts = parts.len(),
                "multipart message stored"
            );
            job.complete = true;
            Ok((job, Hold::Release))
        } else {
            job.chunk_num += 1;
            Ok((job, Hold::Keep))
        }
    }

    async fn acknowledge(&self, job: &FetchJob) -> Result<(), RelayError> {
        self.transport
            .acknowledge(&job.dest_mailbox, &job.message_id)
            .await?;
        Ok(())
    }
}
