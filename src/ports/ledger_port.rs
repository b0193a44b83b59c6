//! Track-record ledger port traits.
//!
//! The ledger writer talks to the outside through these: a remote ingest
//! endpoint that acknowledges events, durable local state, and an optional
//! remote recovery lookup keyed by instance id.

use crate::domain::error::EaforgeError;
use crate::domain::track_record::chain::{ChainState, TrackRecordEvent};

/// Outcome of delivering one event to the ingest endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Accepted,
    Rejected(String),
}

pub trait IngestPort {
    /// Deliver one event. `Err` is a transport failure; a refusal by the
    /// remote is `Ok(Ack::Rejected(..))`.
    fn submit(&mut self, event: &TrackRecordEvent) -> Result<Ack, EaforgeError>;
}

pub trait ChainStore {
    fn load(&self) -> Result<Option<ChainState>, EaforgeError>;
    fn save(&mut self, state: &ChainState) -> Result<(), EaforgeError>;
}

pub trait RecoveryPort {
    fn recover(&self, instance_id: &str) -> Result<Option<ChainState>, EaforgeError>;
}
