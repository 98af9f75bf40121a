use courier_protocol::{SendJob, TransferParameters, calculate_chunks, meta, parse_bool};
use courier_storage::{ObjectInfo, ObjectStore, StorageError};
use tracing::debug;
use uuid::Uuid;

use crate::{RelayConfig, RelayError, RouteLookup};

/// Derives the complete parameter set for sending one stored object.
///
/// Routing comes from the object's own metadata when it carries `mbx-from`,
/// otherwise from the routing table keyed by the object's folder. Resolution
/// is read-only: nothing is locked or written, so a failed invocation can
/// simply run again.
pub async fn resolve_send_parameters(
    store: &dyn ObjectStore,
    routes: &dyn RouteLookup,
    config: &RelayConfig,
    bucket: &str,
    key: &str,
) -> Result<TransferParameters, RelayError> {
    let info = match store.head_object(bucket, key).await {
        Ok(info) => info,
        Err(StorageError::NotFound { .. }) => {
            return Err(RelayError::SourceNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        Err(err) => return Err(err.into()),
    };

    let mut params = if let Some(sender) = info.metadata.get(meta::FROM) {
        // Self-describing object: routing travels in its metadata.
        let recipient = info
            .metadata
            .get(meta::TO)
            .ok_or_else(|| RelayError::MissingParameter {
                name: meta::TO.to_string(),
            })?;
        TransferParameters::new(
            bucket,
            key,
            sender,
            recipient,
            info.metadata.get(meta::WORKFLOW_ID).cloned(),
        )
    } else {
        let folder = folder_of(key);
        let route = routes
            .outbound_route(bucket, folder)
            .await?
            .ok_or_else(|| RelayError::MissingRoute {
                bucket: bucket.to_string(),
                folder: folder.to_string(),
            })?;
        TransferParameters::new(bucket, key, route.sender, route.recipient, route.workflow_id)
    };

    params.filename = info.metadata.get(meta::FILENAME).cloned().or_else(|| {
        if config.use_key_for_filename {
            Some(basename_of(key).to_string())
        } else {
            None
        }
    });
    params.file_size = info.size;
    if !info.content_type.is_empty() {
        params.content_type = info.content_type.clone();
    }
    params.content_encoding = info.content_encoding.clone();
    params.compressed = meta_bool(&info, meta::CONTENT_COMPRESSED);
    params.encrypted = meta_bool(&info, meta::CONTENT_ENCRYPTED);
    params.checksum = info.metadata.get(meta::CONTENT_CHECKSUM).cloned();
    params.local_id = info.metadata.get(meta::LOCAL_ID).cloned();
    params.subject = info.metadata.get(meta::SUBJECT).cloned();
    params.partner_id = info.metadata.get(meta::PARTNER_ID).cloned();
    params.compress = compress_decision(config, &info, params.compressed);

    let (chunked, total_chunks) = calculate_chunks(params.file_size, config.chunk_size);
    params.chunked = chunked;
    params.total_chunks = total_chunks;

    debug!(
        bucket,
        key,
        sender = params.sender,
        recipient = params.recipient,
        file_size = params.file_size,
        total_chunks,
        "send parameters resolved"
    );
    Ok(params)
}

/// Resolves parameters and wraps them in the first-chunk job of a new chain.
pub async fn prepare_send_job(
    store: &dyn ObjectStore,
    routes: &dyn RouteLookup,
    config: &RelayConfig,
    bucket: &str,
    key: &str,
    execution_id: Option<String>,
) -> Result<SendJob, RelayError> {
    let params = resolve_send_parameters(store, routes, config, bucket, key).await?;
    let execution_id =
        execution_id.unwrap_or_else(|| format!("internal_{}", Uuid::new_v4()));
    Ok(SendJob::first_chunk(params, execution_id))
}

/// Whether to compress in transit.
///
/// A global disable or an already-compressed payload is final. Otherwise an
/// explicit `mbx-content-compress` override wins; without one, encoded
/// payloads stay as they are and large payloads default to on. `None` leaves
/// the decision to the transport.
fn compress_decision(
    config: &RelayConfig,
    info: &ObjectInfo,
    compressed: Option<bool>,
) -> Option<bool> {
    if config.never_compress || compressed == Some(true) {
        return Some(false);
    }
    if let Some(explicit) = meta_bool(info, meta::CONTENT_COMPRESS) {
        return Some(explicit);
    }
    if info.content_encoding.as_deref().is_some_and(|e| !e.is_empty()) {
        return Some(false);
    }
    if info.size >= config.compress_threshold {
        return Some(true);
    }
    None
}

fn meta_bool(info: &ObjectInfo, key: &str) -> Option<bool> {
    info.metadata.get(key).and_then(|v| parse_bool(v))
}

/// Folder component of a key, up to and including the final slash.
fn folder_of(key: &str) -> &str {
    match key.rfind('/') {
        Some(pos) => &key[..=pos],
        None => "",
    }
}

fn basename_of(key: &str) -> &str {
    match key.rfind('/') {
        Some(pos) => &key[pos + 1..],
        None => key,
    }
}
