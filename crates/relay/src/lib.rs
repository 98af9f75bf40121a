//! Relay core: the chunked-transfer state machines and their collaborators.
//!
//! Each invocation performs exactly one bounded step of a transfer and
//! returns the next job payload; the surrounding orchestration feeds that
//! output back in as the next invocation's input. Concurrent chains are
//! excluded per resource by the distributed lock.

mod config;
mod error;
mod fetch;
mod poll;
mod resolve;
mod routes;
mod send;

pub use config::RelayConfig;
pub use error::RelayError;
pub use fetch::FetchChunkTask;
pub use poll::{PollOutcome, PollRequest, PollTask};
pub use resolve::{prepare_send_job, resolve_send_parameters};
pub use routes::{InboundLocation, OutboundRoute, RouteLookup, StaticRoutes};
pub use send::SendChunkTask;
