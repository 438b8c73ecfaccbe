//! Persistent storage using RocksDB.
//!
//! Layout:
//! - `ledger:state` - JSON snapshot of the whole ledger
//! - `meta:next_event` - next event sequence number (big-endian u64)
//! - `event:{seq:020}` - event log, one JSON event per key
//! - `blob:{address}` - content-addressed JSON documents

use crate::error::{Error, Result};
use aloha_ledger::blob::content_address;
use aloha_ledger::{BlobStore, LedgerEvent, LedgerState};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

const STATE_KEY: &[u8] = b"ledger:state";
const NEXT_EVENT_KEY: &[u8] = b"meta:next_event";
const EVENT_PREFIX: &str = "event:";
const BLOB_PREFIX: &str = "blob:";

/// An event together with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub seq: u64,
    #[serde(flatten)]
    pub event: LedgerEvent,
}

/// Storage backend for ledger data.
pub struct Storage {
    db: DB,
}

fn event_key(seq: u64) -> String {
    format!("{}{:020}", EVENT_PREFIX, seq)
}

impl Storage {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db })
    }

    /// Open existing storage without write access.
    #[cfg(test)]
    pub(crate) fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = DB::open_for_read_only(&Options::default(), path, false)?;
        Ok(Self { db })
    }

    // --- Ledger ---

    /// Load the last committed ledger snapshot, if any.
    pub fn load_state(&self) -> Result<Option<LedgerState>> {
        match self.db.get(STATE_KEY)? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    fn next_event_seq(&self) -> Result<u64> {
        match self.db.get(NEXT_EVENT_KEY)? {
            Some(data) => {
                let bytes: [u8; 8] = data
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Storage("Invalid event counter".into()))?;
                Ok(u64::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    /// Write a snapshot and append its events in one atomic batch.
    ///
    /// Returns the number of events in the log afterwards. Only the ledger
    /// task calls this, so the counter read is not raced.
    pub fn commit(&self, state: &LedgerState, events: &[LedgerEvent]) -> Result<u64> {
        let mut seq = self.next_event_seq()?;
        let mut batch = WriteBatch::default();

        batch.put(STATE_KEY, serde_json::to_vec(state)?);
        for event in events {
            batch.put(event_key(seq).as_bytes(), serde_json::to_vec(event)?);
            seq += 1;
        }
        batch.put(NEXT_EVENT_KEY, seq.to_be_bytes());

        self.db.write(batch)?;
        Ok(seq)
    }

    /// Read up to `limit` events starting at sequence `from`.
    pub fn events(&self, from: u64, limit: usize) -> Result<Vec<LoggedEvent>> {
        let start = event_key(from);
        let prefix = EVENT_PREFIX.as_bytes();
        let mut events = Vec::new();

        let iter = self
            .db
            .iterator(IteratorMode::From(start.as_bytes(), Direction::Forward));
        for item in iter {
            if events.len() >= limit {
                break;
            }
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            let seq = std::str::from_utf8(&key[prefix.len()..])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| Error::Storage("Invalid event key".into()))?;
            events.push(LoggedEvent {
                seq,
                event: serde_json::from_slice(&value)?,
            });
        }

        Ok(events)
    }

    // --- Blobs ---

    /// Store a JSON document under its content address.
    pub fn put_blob(&self, document: &Value) -> Result<String> {
        let address = content_address(document);
        let key = format!("{}{}", BLOB_PREFIX, address);
        if self.db.get(key.as_bytes())?.is_none() {
            self.db.put(key.as_bytes(), serde_json::to_vec(document)?)?;
        }
        Ok(address)
    }

    /// Get a document by content address.
    pub fn get_blob(&self, address: &str) -> Result<Option<Value>> {
        let key = format!("{}{}", BLOB_PREFIX, address);
        match self.db.get(key.as_bytes())? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }
}

impl BlobStore for &Storage {
    type Error = Error;

    fn put(&mut self, document: &Value) -> Result<String> {
        self.put_blob(document)
    }

    fn get(&self, address: &str) -> Result<Option<Value>> {
        self.get_blob(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aloha_ledger::{Account, EngineConfig, Genesis, SurferId};
    use serde_json::json;
    use tempfile::tempdir;

    fn state() -> LedgerState {
        let genesis = Genesis::empty().with_surfer(Account([1; 20]), "Surfer1", "QmOne");
        LedgerState::new(&EngineConfig::new(Account([0xad; 20])), &genesis).unwrap()
    }

    #[test]
    fn empty_storage_has_no_state() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        assert!(storage.load_state().unwrap().is_none());
        assert!(storage.events(0, 10).unwrap().is_empty());
    }

    #[test]
    fn commit_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let state = state();

        let count = storage.commit(&state, &[]).unwrap();
        assert_eq!(count, 0);
        assert_eq!(storage.load_state().unwrap(), Some(state));
    }

    #[test]
    fn events_append_in_order() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let state = state();
        let removed = |n: u8| LedgerEvent::SurferRemoved {
            surfer: SurferId([n; 32]),
        };

        storage.commit(&state, &[removed(1), removed(2)]).unwrap();
        let count = storage.commit(&state, &[removed(3)]).unwrap();
        assert_eq!(count, 3);

        let all = storage.events(0, 100).unwrap();
        assert_eq!(all.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(all[2].event, removed(3));

        let tail = storage.events(1, 1).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].seq, 1);
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempdir().unwrap();
        let state = state();
        {
            let storage = Storage::open(dir.path()).unwrap();
            storage.commit(&state, &[]).unwrap();
        }
        let storage = Storage::open(dir.path()).unwrap();
        assert_eq!(storage.load_state().unwrap(), Some(state));
    }

    #[test]
    fn blobs_are_content_addressed() {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let profile = json!({"name": "Kelly", "stance": "Regular"});

        let mut store = &storage;
        let address = store.put(&profile).unwrap();
        assert_eq!(address, content_address(&profile));
        assert_eq!(store.get(&address).unwrap(), Some(profile));
        assert_eq!(storage.get_blob("missing").unwrap(), None);
    }
}
