use std::collections::HashMap;

use async_trait::async_trait;

use crate::RelayError;

/// Routing for an outbound folder: who sends, who receives, which workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRoute {
    pub sender: String,
    pub recipient: String,
    pub workflow_id: Option<String>,
}

/// Destination for messages fetched from one mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundLocation {
    pub bucket: String,
    /// Key prefix, without a trailing slash. Empty means the bucket root.
    pub prefix: String,
}

impl InboundLocation {
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            bucket: bucket.into(),
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Full destination key for a filename landing under this location.
    pub fn key_for(&self, mailbox: &str, filename: &str) -> String {
        if self.prefix.is_empty() {
            format!("{mailbox}/{filename}")
        } else {
            format!("{}/{mailbox}/{filename}", self.prefix)
        }
    }
}

/// Routing table lookups.
///
/// The lookups are read-only: resolution must not mutate any shared state so
/// a failed invocation can be retried from scratch.
#[async_trait]
pub trait RouteLookup: Send + Sync {
    /// Route for objects appearing under `folder` in `bucket`, if configured.
    async fn outbound_route(
        &self,
        bucket: &str,
        folder: &str,
    ) -> Result<Option<OutboundRoute>, RelayError>;

    /// Where messages fetched from `mailbox` are written.
    async fn inbound_location(&self, mailbox: &str) -> Result<InboundLocation, RelayError>;
}

/// Fixed in-process routing table.
#[derive(Default)]
pub struct StaticRoutes {
    outbound: HashMap<(String, String), OutboundRoute>,
    inbound: HashMap<String, InboundLocation>,
}

impl StaticRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route_folder(
        mut self,
        bucket: impl Into<String>,
        folder: impl Into<String>,
        route: OutboundRoute,
    ) -> Self {
        self.outbound.insert((bucket.into(), folder.into()), route);
        self
    }

    pub fn route_mailbox(mut self, mailbox: impl Into<String>, location: InboundLocation) -> Self {
        self.inbound.insert(mailbox.into(), location);
        self
    }
}

#[async_trait]
impl RouteLookup for StaticRoutes {
    async fn outbound_route(
        &self,
        bucket: &str,
        folder: &str,
    ) -> Result<Option<OutboundRoute>, RelayError> {
        Ok(self
            .outbound
            .get(&(bucket.to_string(), folder.to_string()))
            .cloned())
    }

    async fn inbound_location(&self, mailbox: &str) -> Result<InboundLocation, RelayError> {
        self.inbound
            .get(mailbox)
            .cloned()
            .ok_or_else(|| RelayError::MissingInboundLocation {
                mailbox: mailbox.to_string(),
            })
    }
}
