mod common;

use common::*;
use eaforge::adapters::ledger_file_adapter::{FileChainStore, JsonlEventLog};
use eaforge::domain::error::EaforgeError;
use eaforge::domain::track_record::chain::{
    ChainError, ChainState, ChainWriter, EventType, GENESIS_HASH, StateOrigin, TrackRecordEvent,
    verify_chain,
};
use eaforge::ports::ledger_port::{Ack, ChainStore, IngestPort, RecoveryPort};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Recovers the head of a server-side log.
struct LogRecovery {
    log: PathBuf,
}

impl RecoveryPort for LogRecovery {
    fn recover(&self, instance_id: &str) -> Result<Option<ChainState>, EaforgeError> {
        let events = JsonlEventLog::new(self.log.clone()).read_events()?;
        Ok(events
            .iter()
            .rev()
            .find(|e| e.ea_instance_id == instance_id)
            .map(ChainState::after))
    }
}

/// Accepts until `fail_at`, then rejects that sequence number once.
struct FlakyIngest {
    inner: JsonlEventLog,
    fail_at: Option<u64>,
}

impl IngestPort for FlakyIngest {
    fn submit(&mut self, event: &TrackRecordEvent) -> Result<Ack, EaforgeError> {
        if self.fail_at == Some(event.seq_no) {
            self.fail_at = None;
            return Ok(Ack::Rejected("503 service unavailable".into()));
        }
        self.inner.submit(event)
    }
}

fn payload(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn session(dir: &TempDir, instance: &str) -> ChainWriter<JsonlEventLog, FileChainStore> {
    ChainWriter::open(
        instance,
        JsonlEventLog::new(temp_path(dir, "events.jsonl")),
        FileChainStore::new(temp_path(dir, "state.dat")),
        None,
    )
    .unwrap()
}

mod writing {
    use super::*;

    #[test]
    fn first_event_links_to_genesis() {
        let dir = TempDir::new().unwrap();
        let mut writer = session(&dir, "acct-1");
        assert_eq!(writer.origin(), StateOrigin::Fresh);
        let event = writer
            .emit(EventType::SessionStart, 1_700_000_000, BTreeMap::new())
            .unwrap();
        assert_eq!(event.seq_no, 0);
        assert_eq!(event.prev_hash, GENESIS_HASH);
        assert_eq!(event.event_hash.len(), 64);
        assert_eq!(writer.state().last_hash, event.event_hash);
    }

    #[test]
    fn trade_lifecycle_verifies() {
        let dir = TempDir::new().unwrap();
        let mut writer = session(&dir, "acct-1");
        writer.emit(EventType::SessionStart, 100, BTreeMap::new()).unwrap();
        writer
            .emit(
                EventType::TradeOpen,
                110,
                payload(&[("ticket", "501"), ("symbol", "EURUSD"), ("volume", "0.10")]),
            )
            .unwrap();
        writer
            .emit(EventType::TradeModify, 120, payload(&[("ticket", "501"), ("sl", "1.0800")]))
            .unwrap();
        writer
            .emit(EventType::TradeClose, 130, payload(&[("ticket", "501"), ("profit", "12.50")]))
            .unwrap();
        writer.emit(EventType::SessionEnd, 140, BTreeMap::new()).unwrap();

        let events = JsonlEventLog::new(temp_path(&dir, "events.jsonl"))
            .read_events()
            .unwrap();
        assert_eq!(events.len(), 5);
        assert_eq!(
            events.iter().map(|e| e.seq_no).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
        verify_chain(&events).unwrap();
    }

    #[test]
    fn rejection_leaves_state_untouched() {
        let dir = TempDir::new().unwrap();
        let mut writer = ChainWriter::open(
            "acct-2",
            FlakyIngest {
                inner: JsonlEventLog::new(temp_path(&dir, "events.jsonl")),
                fail_at: Some(1),
            },
            FileChainStore::new(temp_path(&dir, "state.dat")),
            None,
        )
        .unwrap();

        writer.emit(EventType::SessionStart, 100, BTreeMap::new()).unwrap();
        let before = writer.state().clone();
        let err = writer.emit(EventType::Snapshot, 200, BTreeMap::new()).unwrap_err();
        assert!(matches!(
            err,
            EaforgeError::Chain(ChainError::Rejected { seq_no: 1, .. })
        ));
        assert_eq!(writer.state(), &before);

        let retried = writer.emit(EventType::Snapshot, 260, BTreeMap::new()).unwrap();
        assert_eq!(retried.seq_no, 1);
        let events = JsonlEventLog::new(temp_path(&dir, "events.jsonl"))
            .read_events()
            .unwrap();
        verify_chain(&events).unwrap();
    }

    #[test]
    fn reserved_payload_key_rejected() {
        let dir = TempDir::new().unwrap();
        let mut writer = session(&dir, "acct-3");
        let err = writer
            .emit(EventType::Snapshot, 100, payload(&[("seqNo", "99")]))
            .unwrap_err();
        assert!(matches!(
            err,
            EaforgeError::Chain(ChainError::ReservedPayloadKey(key)) if key == "seqNo"
        ));
        assert_eq!(writer.state().next_seq(), 0);
    }
}

mod resuming {
    use super::*;

    #[test]
    fn state_file_from_other_instance_is_ignored() {
        let dir = TempDir::new().unwrap();
        let mut first = session(&dir, "acct-a");
        first.emit(EventType::SessionStart, 100, BTreeMap::new()).unwrap();
        drop(first);

        let other = ChainWriter::open(
            "acct-b",
            JsonlEventLog::new(temp_path(&dir, "other.jsonl")),
            FileChainStore::new(temp_path(&dir, "state.dat")),
            None,
        )
        .unwrap();
        assert_eq!(other.origin(), StateOrigin::Fresh);
        assert_eq!(other.state().last_seq, None);
    }

    #[test]
    fn lost_state_recovered_from_server_log() {
        let dir = TempDir::new().unwrap();
        let mut writer = session(&dir, "acct-r");
        writer.emit(EventType::SessionStart, 100, BTreeMap::new()).unwrap();
        writer.emit(EventType::Snapshot, 200, BTreeMap::new()).unwrap();
        drop(writer);
        fs::remove_file(temp_path(&dir, "state.dat")).unwrap();

        let recovery = LogRecovery {
            log: temp_path(&dir, "events.jsonl"),
        };
        let mut resumed = ChainWriter::open(
            "acct-r",
            JsonlEventLog::new(temp_path(&dir, "events.jsonl")),
            FileChainStore::new(temp_path(&dir, "state.dat")),
            Some(&recovery),
        )
        .unwrap();
        assert_eq!(resumed.origin(), StateOrigin::Recovered);
        assert_eq!(resumed.state().last_seq, Some(1));
        resumed.emit(EventType::SessionEnd, 300, BTreeMap::new()).unwrap();

        let store = FileChainStore::new(temp_path(&dir, "state.dat"));
        assert_eq!(store.load().unwrap().and_then(|s| s.last_seq), Some(2));

        let events = JsonlEventLog::new(temp_path(&dir, "events.jsonl"))
            .read_events()
            .unwrap();
        verify_chain(&events).unwrap();
    }
}

mod tampering {
    use super::*;

    fn three_events(dir: &TempDir) -> Vec<TrackRecordEvent> {
        let mut writer = session(dir, "acct-t");
        for (i, ticket) in ["1", "2", "3"].iter().enumerate() {
            writer
                .emit(EventType::TradeOpen, 100 + i as i64, payload(&[("ticket", *ticket)]))
                .unwrap();
        }
        JsonlEventLog::new(temp_path(dir, "events.jsonl"))
            .read_events()
            .unwrap()
    }

    #[test]
    fn dropped_event_is_a_gap() {
        let dir = TempDir::new().unwrap();
        let mut events = three_events(&dir);
        events.remove(1);
        assert!(matches!(
            verify_chain(&events),
            Err(ChainError::SequenceGap { index: 1, expected: 1, found: 2 })
        ));
    }

    #[test]
    fn edited_payload_breaks_hash() {
        let dir = TempDir::new().unwrap();
        let mut events = three_events(&dir);
        events[2].payload.insert("ticket".into(), "999".into());
        assert!(matches!(
            verify_chain(&events),
            Err(ChainError::HashMismatch { seq_no: 2, .. })
        ));
    }

    #[test]
    fn rehashed_edit_breaks_link() {
        let dir = TempDir::new().unwrap();
        let mut events = three_events(&dir);
        events[1].payload.insert("ticket".into(), "999".into());
        events[1].event_hash = events[1].compute_hash().unwrap();
        assert!(matches!(
            verify_chain(&events),
            Err(ChainError::PrevHashMismatch { seq_no: 2, .. })
        ));
    }

    #[test]
    fn tail_of_log_verifies_alone() {
        let dir = TempDir::new().unwrap();
        let events = three_events(&dir);
        verify_chain(&events[1..]).unwrap();
    }
}
