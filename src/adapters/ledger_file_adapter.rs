//! File-backed track-record ledger adapters.
//!
//! [`FileChainStore`] keeps chain state in the same `seqNo|lastHash|instanceId`
//! layout the generated program writes. [`JsonlEventLog`] holds one event per
//! line, as captured from an ingest endpoint.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use tracing::warn;

use crate::domain::error::EaforgeError;
use crate::domain::track_record::chain::{ChainState, TrackRecordEvent};
use crate::ports::ledger_port::{Ack, ChainStore, IngestPort};

pub struct FileChainStore {
    path: PathBuf,
}

impl FileChainStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ChainStore for FileChainStore {
    fn load(&self) -> Result<Option<ChainState>, EaforgeError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)?;
        let state = ChainState::parse_line(&text);
        if state.is_none() {
            warn!(path = %self.path.display(), "unreadable chain state file ignored");
        }
        Ok(state)
    }

    fn save(&mut self, state: &ChainState) -> Result<(), EaforgeError> {
        fs::write(&self.path, state.to_line())?;
        Ok(())
    }
}

pub struct JsonlEventLog {
    path: PathBuf,
}

impl JsonlEventLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read every event; blank lines are skipped.
    pub fn read_events(&self) -> Result<Vec<TrackRecordEvent>, EaforgeError> {
        let text = fs::read_to_string(&self.path)?;
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line).map_err(|e| EaforgeError::InvalidDocument {
                    reason: format!("{} line {}: {}", self.path.display(), n + 1, e),
                })
            })
            .collect()
    }
}

/// Appending to the log counts as acknowledgment.
impl IngestPort for JsonlEventLog {
    fn submit(&mut self, event: &TrackRecordEvent) -> Result<Ack, EaforgeError> {
        let line = serde_json::to_string(event)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(Ack::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::track_record::chain::{ChainWriter, EventType, StateOrigin, verify_chain};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn store_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = FileChainStore::new(dir.path().join("state.dat"));
        assert_eq!(store.load().unwrap(), None);
        let state = ChainState {
            last_seq: Some(4),
            last_hash: "d".repeat(64),
            instance_id: "acct-9".into(),
        };
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), Some(state));
    }

    #[test]
    fn garbage_state_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.dat");
        fs::write(&path, "not a state").unwrap();
        assert_eq!(FileChainStore::new(path).load().unwrap(), None);
    }

    #[test]
    fn writer_resumes_from_files() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("events.jsonl");
        let state = dir.path().join("state.dat");

        let mut writer = ChainWriter::open(
            "acct-1",
            JsonlEventLog::new(log.clone()),
            FileChainStore::new(state.clone()),
            None,
        )
        .unwrap();
        writer.emit(EventType::SessionStart, 100, BTreeMap::new()).unwrap();
        writer.emit(EventType::SessionEnd, 200, BTreeMap::new()).unwrap();
        drop(writer);

        let mut resumed = ChainWriter::open(
            "acct-1",
            JsonlEventLog::new(log.clone()),
            FileChainStore::new(state),
            None,
        )
        .unwrap();
        assert_eq!(resumed.origin(), StateOrigin::Local);
        resumed.emit(EventType::SessionStart, 300, BTreeMap::new()).unwrap();

        let events = JsonlEventLog::new(log).read_events().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2].seq_no, 2);
        verify_chain(&events).unwrap();
    }

    #[test]
    fn bad_line_is_reported_with_number() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        fs::write(&path, "\n{\"broken\": true}\n").unwrap();
        let err = JsonlEventLog::new(path).read_events().unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
