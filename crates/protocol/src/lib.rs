//! Serializable contracts shared by the courier relay functions.
//!
//! Every transfer crosses invocation boundaries as a JSON job payload: the
//! output of one invocation is fed back in as the input of the next. The
//! types here are that wire contract, so field names are stable and covered
//! by tests.

mod jobs;
mod metadata;
mod params;

pub use jobs::{FetchJob, PartTag, SendJob};
pub use metadata::{MessageType, meta, parse_bool};
pub use params::{TransferParameters, calculate_chunks};

/// Lock name guarding one outbound transfer, keyed by the source object.
pub fn send_lock_name(bucket: &str, key: &str) -> String {
    format!("SendLock_{bucket}_{key}")
}

/// Lock name guarding inbound processing for one mailbox.
pub fn fetch_lock_name(mailbox: &str) -> String {
    format!("FetchLock_{mailbox}")
}
