//! Hash-chained track-record ledger.
//!
//! Each event carries `seqNo`, `prevHash` and `eventHash`. The hash covers a
//! canonical JSON object: the reserved fields plus the flat string payload,
//! keys sorted, no whitespace, `seqNo` and `timestamp` as numbers. The
//! generated MQL5 ledger builds byte-identical canonical text, so chains
//! produced live can be verified here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::domain::error::EaforgeError;
use crate::ports::ledger_port::{Ack, ChainStore, IngestPort, RecoveryPort};

/// `prevHash` of the first event in a chain.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

pub const RESERVED_KEYS: [&str; 5] = ["eaInstanceId", "eventType", "prevHash", "seqNo", "timestamp"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("event {index}: expected seqNo {expected}, found {found}")]
    SequenceGap { index: usize, expected: u64, found: u64 },

    #[error("seqNo {seq_no}: prevHash {found} does not link to {expected}")]
    PrevHashMismatch {
        seq_no: u64,
        expected: String,
        found: String,
    },

    #[error("seqNo {seq_no}: eventHash {found} does not match recomputed {expected}")]
    HashMismatch {
        seq_no: u64,
        expected: String,
        found: String,
    },

    #[error("payload key '{0}' collides with a reserved field")]
    ReservedPayloadKey(String),

    #[error("seqNo {seq_no} rejected by ingest: {reason}")]
    Rejected { seq_no: u64, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    TradeOpen,
    TradeClose,
    TradeModify,
    PartialClose,
    Snapshot,
    SessionStart,
    SessionEnd,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::TradeOpen => "TRADE_OPEN",
            EventType::TradeClose => "TRADE_CLOSE",
            EventType::TradeModify => "TRADE_MODIFY",
            EventType::PartialClose => "PARTIAL_CLOSE",
            EventType::Snapshot => "SNAPSHOT",
            EventType::SessionStart => "SESSION_START",
            EventType::SessionEnd => "SESSION_END",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRecordEvent {
    pub ea_instance_id: String,
    pub event_type: EventType,
    pub seq_no: u64,
    pub prev_hash: String,
    pub event_hash: String,
    /// Unix seconds.
    pub timestamp: i64,
    #[serde(default)]
    pub payload: BTreeMap<String, String>,
}

impl TrackRecordEvent {
    /// Build an event and fill in its hash.
    pub fn new(
        ea_instance_id: &str,
        event_type: EventType,
        seq_no: u64,
        prev_hash: &str,
        timestamp: i64,
        payload: BTreeMap<String, String>,
    ) -> Result<Self, ChainError> {
        let mut event = Self {
            ea_instance_id: ea_instance_id.to_string(),
            event_type,
            seq_no,
            prev_hash: prev_hash.to_string(),
            event_hash: String::new(),
            timestamp,
            payload,
        };
        event.event_hash = event.compute_hash()?;
        Ok(event)
    }

    pub fn canonical(&self) -> Result<String, ChainError> {
        let mut fields: BTreeMap<&str, Value> = BTreeMap::new();
        fields.insert("eaInstanceId", Value::from(self.ea_instance_id.as_str()));
        fields.insert("eventType", Value::from(self.event_type.as_str()));
        fields.insert("prevHash", Value::from(self.prev_hash.as_str()));
        fields.insert("seqNo", Value::from(self.seq_no));
        fields.insert("timestamp", Value::from(self.timestamp));
        for (key, value) in &self.payload {
            if RESERVED_KEYS.contains(&key.as_str()) {
                return Err(ChainError::ReservedPayloadKey(key.clone()));
            }
            fields.insert(key.as_str(), Value::from(value.as_str()));
        }
        // A map of plain JSON values always serializes.
        Ok(serde_json::to_string(&fields).unwrap_or_default())
    }

    pub fn compute_hash(&self) -> Result<String, ChainError> {
        Ok(sha256_hex(&self.canonical()?))
    }
}

pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Position of a chain: the last acknowledged sequence number and hash.
/// A fresh chain has no last sequence number and links to the genesis hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainState {
    pub last_seq: Option<u64>,
    pub last_hash: String,
    pub instance_id: String,
}

impl ChainState {
    pub fn fresh(instance_id: &str) -> Self {
        Self {
            last_seq: None,
            last_hash: GENESIS_HASH.to_string(),
            instance_id: instance_id.to_string(),
        }
    }

    /// State after `event` has been acknowledged.
    pub fn after(event: &TrackRecordEvent) -> Self {
        Self {
            last_seq: Some(event.seq_no),
            last_hash: event.event_hash.clone(),
            instance_id: event.ea_instance_id.clone(),
        }
    }

    /// `seqNo` the next event carries; 0 on a fresh chain.
    pub fn next_seq(&self) -> u64 {
        self.last_seq.map_or(0, |seq| seq + 1)
    }

    /// `seqNo|lastHash|instanceId`, the layout of the generated program's
    /// state file. A fresh chain writes `-1`.
    pub fn to_line(&self) -> String {
        let seq = match self.last_seq {
            Some(seq) => seq.to_string(),
            None => "-1".to_string(),
        };
        format!("{}|{}|{}", seq, self.last_hash, self.instance_id)
    }

    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.trim().splitn(3, '|');
        let last_seq = match parts.next()? {
            "-1" => None,
            seq => Some(seq.parse().ok()?),
        };
        let last_hash = parts.next()?.to_string();
        let instance_id = parts.next()?.to_string();
        if last_hash.len() != 64 || instance_id.is_empty() {
            return None;
        }
        Some(Self {
            last_seq,
            last_hash,
            instance_id,
        })
    }
}

/// Where a writer's starting state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOrigin {
    Local,
    Recovered,
    Fresh,
}

/// Appends events to a chain. Local state only advances after the ingest
/// endpoint acknowledges an event, so a lost request never forks the chain.
pub struct ChainWriter<I, S> {
    ingest: I,
    store: S,
    state: ChainState,
    origin: StateOrigin,
}

impl<I: IngestPort, S: ChainStore> ChainWriter<I, S> {
    /// Resume from local state, else from remote recovery, else start fresh.
    pub fn open(
        instance_id: &str,
        ingest: I,
        mut store: S,
        recovery: Option<&dyn RecoveryPort>,
    ) -> Result<Self, EaforgeError> {
        let local = match store.load()? {
            Some(state) if state.instance_id == instance_id => Some(state),
            Some(state) => {
                warn!(
                    stored = %state.instance_id,
                    wanted = instance_id,
                    "ignoring local chain state for another instance"
                );
                None
            }
            None => None,
        };

        let (state, origin) = match local {
            Some(state) => (state, StateOrigin::Local),
            None => match recovery {
                Some(port) => match port.recover(instance_id)? {
                    Some(state) => {
                        store.save(&state)?;
                        (state, StateOrigin::Recovered)
                    }
                    None => (ChainState::fresh(instance_id), StateOrigin::Fresh),
                },
                None => (ChainState::fresh(instance_id), StateOrigin::Fresh),
            },
        };
        info!(instance_id, next_seq = state.next_seq(), origin = ?origin, "chain opened");

        Ok(Self {
            ingest,
            store,
            state,
            origin,
        })
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn origin(&self) -> StateOrigin {
        self.origin
    }

    pub fn into_parts(self) -> (I, S) {
        (self.ingest, self.store)
    }

    /// Build the next event, submit it and advance on acknowledgment.
    pub fn emit(
        &mut self,
        event_type: EventType,
        timestamp: i64,
        payload: BTreeMap<String, String>,
    ) -> Result<TrackRecordEvent, EaforgeError> {
        let event = TrackRecordEvent::new(
            &self.state.instance_id,
            event_type,
            self.state.next_seq(),
            &self.state.last_hash,
            timestamp,
            payload,
        )?;

        match self.ingest.submit(&event)? {
            Ack::Accepted => {
                let next = ChainState::after(&event);
                self.store.save(&next)?;
                self.state = next;
                debug!(seq_no = event.seq_no, event = event_type.as_str(), "event acknowledged");
                Ok(event)
            }
            Ack::Rejected(reason) => {
                warn!(seq_no = event.seq_no, %reason, "event rejected");
                Err(ChainError::Rejected {
                    seq_no: event.seq_no,
                    reason,
                }
                .into())
            }
        }
    }
}

/// Check sequence continuity, hash links and every recomputed hash.
///
/// A log that begins at `seqNo` 0 must link to the genesis hash; a log that
/// begins later is trusted for its first `prevHash` only.
pub fn verify_chain(events: &[TrackRecordEvent]) -> Result<(), ChainError> {
    let mut previous: Option<&TrackRecordEvent> = None;
    for (index, event) in events.iter().enumerate() {
        match previous {
            Some(prev) => {
                if event.seq_no != prev.seq_no + 1 {
                    return Err(ChainError::SequenceGap {
                        index,
                        expected: prev.seq_no + 1,
                        found: event.seq_no,
                    });
                }
                if event.prev_hash != prev.event_hash {
                    return Err(ChainError::PrevHashMismatch {
                        seq_no: event.seq_no,
                        expected: prev.event_hash.clone(),
                        found: event.prev_hash.clone(),
                    });
                }
            }
            None if event.seq_no == 0 && event.prev_hash != GENESIS_HASH => {
                return Err(ChainError::PrevHashMismatch {
                    seq_no: 0,
                    expected: GENESIS_HASH.to_string(),
                    found: event.prev_hash.clone(),
                });
            }
            None => {}
        }

        let expected = event.compute_hash()?;
        if expected != event.event_hash {
            return Err(ChainError::HashMismatch {
                seq_no: event.seq_no,
                expected,
                found: event.event_hash.clone(),
            });
        }
        previous = Some(event);
    }
    Ok(())
}
