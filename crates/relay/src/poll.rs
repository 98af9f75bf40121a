use std::sync::Arc;

use courier_lock::{DistributedLock, Hold, LockError};
use courier_protocol::{FetchJob, fetch_lock_name};
use courier_transport::MailboxTransport;
use tracing::info;
use uuid::Uuid;

use crate::{RelayConfig, RelayError};

/// One polling request for a mailbox.
#[derive(Debug, Clone)]
pub struct PollRequest {
    pub mailbox: String,
    /// Handshake-only probe: authenticate and return without listing.
    pub handshake: bool,
    /// Chain identity; assigned internally when the caller has none.
    pub execution_id: Option<String>,
}

impl PollRequest {
    pub fn poll(mailbox: impl Into<String>) -> Self {
        Self {
            mailbox: mailbox.into(),
            handshake: false,
            execution_id: None,
        }
    }

    pub fn handshake(mailbox: impl Into<String>) -> Self {
        Self {
            mailbox: mailbox.into(),
            handshake: true,
            execution_id: None,
        }
    }
}

/// What a polling cycle found.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Handshake probe succeeded.
    Handshake,
    /// Nothing pending; the fetch lock was not kept.
    NoContent,
    /// Another chain already holds the mailbox's fetch lock.
    Conflict { lock_name: String, owner: String },
    /// Pending messages, one first-chunk job each. The fetch lock is held
    /// and travels with the jobs through their chains.
    Messages { jobs: Vec<FetchJob> },
}

/// Mailbox poller: lists pending messages under the fetch lock and fans them
/// out as fetch jobs.
pub struct PollTask {
    transport: Arc<dyn MailboxTransport>,
    lock: DistributedLock,
    config: RelayConfig,
}

impl PollTask {
    pub fn new(
        transport: Arc<dyn MailboxTransport>,
        lock: DistributedLock,
        config: RelayConfig,
    ) -> Self {
        Self {
            transport,
            lock,
            config,
        }
    }

    pub async fn run(&self, request: PollRequest) -> Result<PollOutcome, RelayError> {
        if request.handshake {
            self.transport.handshake(&request.mailbox).await?;
            return Ok(PollOutcome::Handshake);
        }

        let mailbox = request.mailbox;
        let execution_id = request
            .execution_id
            .unwrap_or_else(|| format!("internal_{}", Uuid::new_v4()));
        let lock_name = fetch_lock_name(&mailbox);

        let outcome: Result<PollOutcome, RelayError> = self
            .lock
            .with_lock(&lock_name, &execution_id, async {
                let ids = self
                    .transport
                    .list_messages(&mailbox, self.config.page_limit)
                    .await?;
                if ids.is_empty() {
                    // Nothing to hand to a fetch chain; keeping the lock
                    // would only block the next cycle.
                    return Ok((PollOutcome::NoContent, Hold::Release));
                }
                info!(mailbox, count = ids.len(), "pending messages listed");
                let jobs = ids
                    .into_iter()
                    .map(|id| FetchJob::first_chunk(id, mailbox.as_str(), execution_id.as_str()))
                    .collect();
                Ok((PollOutcome::Messages { jobs }, Hold::Keep))
            })
            .await;

        // Contention is an expected outcome of concurrent schedules, not an
        // error: report who holds the mailbox and move on.
        match outcome {
            Err(RelayError::Lock(LockError::Exists { owner, .. })) => {
                info!(mailbox, lock_name, owner, "mailbox already being polled");
                Ok(PollOutcome::Conflict { lock_name, owner })
            }
            other => other,
        }
    }
}
