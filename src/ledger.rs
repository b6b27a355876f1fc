//! Append-only coordinate ledger, durable per append.
//!
//! Every accepted fix is written through to the key-value store before
//! `append` returns, so a crash immediately after a successful append can
//! never lose that fix. The ledger is keyed by trip id and read back in
//! append order on resume.

use std::fmt;
use std::sync::Arc;

use crate::geo::Fix;
use crate::store::KvStore;

/// Failure while durably recording or reading fixes.
#[derive(Debug)]
pub enum LedgerError {
    Persistence(anyhow::Error),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Persistence(e) => write!(f, "ledger persistence failure: {e}"),
        }
    }
}

impl std::error::Error for LedgerError {}

/// Durable, ordered fix sequence for one trip at a time.
///
/// Exclusively owned by the trip session state machine; nothing else writes
/// to it. The blob format is JSON lines, one fix per line, so an append is
/// a rewrite of record count N+1 rather than a structural merge.
pub struct CoordinateLedger {
    store: Arc<dyn KvStore>,
}

impl CoordinateLedger {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    fn key(trip_id: &str) -> String {
        format!("ledger.{trip_id}")
    }

    /// Durably append one fix. On success the fix is on disk.
    pub fn append(&self, trip_id: &str, fix: &Fix) -> Result<(), LedgerError> {
        let key = Self::key(trip_id);
        let mut blob = self
            .store
            .get(&key)
            .map_err(LedgerError::Persistence)?
            .unwrap_or_default();

        let line = serde_json::to_string(fix)
            .map_err(|e| LedgerError::Persistence(anyhow::anyhow!(e)))?;
        blob.push_str(&line);
        blob.push('\n');

        self.store.set(&key, &blob).map_err(LedgerError::Persistence)
    }

    /// Read the full fix sequence in append order.
    ///
    /// A trailing partial line (torn by a crash mid-write on a store without
    /// atomic writes) is dropped rather than failing the whole read.
    pub fn read_all(&self, trip_id: &str) -> Result<Vec<Fix>, LedgerError> {
        let blob = match self
            .store
            .get(&Self::key(trip_id))
            .map_err(LedgerError::Persistence)?
        {
            Some(blob) => blob,
            None => return Ok(Vec::new()),
        };

        let mut fixes = Vec::new();
        for line in blob.lines() {
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Fix>(line) {
                Ok(fix) => fixes.push(fix),
                Err(e) => {
                    log_warning!("Skipping unreadable ledger line: {}", e);
                }
            }
        }
        Ok(fixes)
    }

    /// Number of ledgered fixes for a trip.
    pub fn len(&self, trip_id: &str) -> Result<usize, LedgerError> {
        Ok(self.read_all(trip_id)?.len())
    }

    /// Drop the whole ledger for a trip.
    pub fn clear(&self, trip_id: &str) -> Result<(), LedgerError> {
        self.store
            .remove(&Self::key(trip_id))
            .map_err(LedgerError::Persistence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKvStore;

    fn fix(lat: f64, lon: f64, t: i64) -> Fix {
        Fix::new(lat, lon, t)
    }

    #[test]
    fn test_append_then_read_all_in_order() {
        let ledger = CoordinateLedger::new(Arc::new(MemoryKvStore::new()));
        let fixes = vec![fix(0.0, 0.0, 1), fix(0.0, 0.5, 2), fix(0.0, 1.0, 3)];

        for f in &fixes {
            ledger.append("t-1", f).unwrap();
        }

        assert_eq!(ledger.read_all("t-1").unwrap(), fixes);
        assert_eq!(ledger.len("t-1").unwrap(), 3);
    }

    #[test]
    fn test_ledgers_are_isolated_by_trip_id() {
        let ledger = CoordinateLedger::new(Arc::new(MemoryKvStore::new()));
        ledger.append("a", &fix(1.0, 1.0, 1)).unwrap();
        ledger.append("b", &fix(2.0, 2.0, 1)).unwrap();

        assert_eq!(ledger.read_all("a").unwrap().len(), 1);
        assert_eq!(ledger.read_all("b").unwrap().len(), 1);
        assert_eq!(ledger.read_all("a").unwrap()[0].latitude, 1.0);
    }

    #[test]
    fn test_clear_empties_the_sequence() {
        let ledger = CoordinateLedger::new(Arc::new(MemoryKvStore::new()));
        ledger.append("t", &fix(0.0, 0.0, 1)).unwrap();
        ledger.clear("t").unwrap();
        assert!(ledger.read_all("t").unwrap().is_empty());
    }

    #[test]
    fn test_read_all_on_unknown_trip_is_empty() {
        let ledger = CoordinateLedger::new(Arc::new(MemoryKvStore::new()));
        assert!(ledger.read_all("nope").unwrap().is_empty());
    }

    #[test]
    fn test_survives_reopen_on_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let fixes = vec![fix(10.0, 10.0, 1), fix(10.0, 10.1, 2)];

        {
            let store = crate::store::FileKvStore::open(dir.path().to_path_buf()).unwrap();
            let ledger = CoordinateLedger::new(Arc::new(store));
            ledger.append("t", &fixes[0]).unwrap();
            ledger.append("t", &fixes[1]).unwrap();
        }

        // Fresh store over the same directory simulates a process restart
        let store = crate::store::FileKvStore::open(dir.path().to_path_buf()).unwrap();
        let ledger = CoordinateLedger::new(Arc::new(store));
        assert_eq!(ledger.read_all("t").unwrap(), fixes);
    }
}
