// Checkpoint records for long sweeps. One JSON document holds the latest
// record per formula, keyed by the formula's exact input parameters; a
// record whose key does not match the requested computation is ignored as
// stale, never reported as an error.

use rug::Integer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Instant;

use crate::error::PixError;
use crate::storage;

/// At most one throttled write per interval; progress lost on interruption
/// is bounded by the same interval
pub const BACKUP_INTERVAL_SECS: f64 = 60.0;

const FORMAT_VERSION: u64 = 1;

/// Snapshot of one formula's sweep. In-flight records carry the sweep
/// position fields; completed records drop them and pin percent to 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// The large argument, as a decimal string to avoid precision loss
    pub x: String,
    pub y: u64,
    pub sieve_limit: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_distance: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prime_count: Option<u64>,
    /// Accumulated sum, decimal string
    pub sum: String,
    pub percent: f64,
    pub seconds: f64,
}

impl CheckpointRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn in_flight(
        x: &Integer,
        y: u64,
        sieve_limit: u64,
        low: u64,
        thread_distance: u64,
        prime_count: u64,
        sum: &Integer,
        percent: f64,
        seconds: f64,
    ) -> Self {
        Self {
            x: x.to_string(),
            y,
            sieve_limit,
            low: Some(low),
            thread_distance: Some(thread_distance),
            prime_count: Some(prime_count),
            sum: sum.to_string(),
            percent,
            seconds,
        }
    }

    pub fn completed(x: &Integer, y: u64, sieve_limit: u64, sum: &Integer, seconds: f64) -> Self {
        Self {
            x: x.to_string(),
            y,
            sieve_limit,
            low: None,
            thread_distance: None,
            prime_count: None,
            sum: sum.to_string(),
            percent: 100.0,
            seconds,
        }
    }

    /// A record is only usable when every defining parameter matches the
    /// requested computation exactly.
    pub fn matches(&self, x: &Integer, y: u64, sieve_limit: u64) -> bool {
        self.x == x.to_string() && self.y == y && self.sieve_limit == sieve_limit
    }

    pub fn is_complete(&self) -> bool {
        self.low.is_none()
    }

    pub fn sum_value(&self) -> Result<Integer, PixError> {
        Integer::from_str_radix(&self.sum, 10)
            .map_err(|e| PixError::Checkpoint(format!("bad sum '{}': {}", self.sum, e)))
    }
}

/// Persists checkpoint records and answers resume requests.
pub struct CheckpointStore {
    path: PathBuf,
    last_write: Option<Instant>,
}

impl CheckpointStore {
    /// Store at the default backup document location.
    pub fn new() -> Self {
        Self::at(storage::backup_path())
    }

    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            last_write: None,
        }
    }

    /// Most recent record for a formula, if any. An unknown document
    /// version or a record that no longer parses is a fresh start, not an
    /// error; only an unreadable document fails.
    pub fn load(&self, formula: &str) -> Result<Option<CheckpointRecord>, PixError> {
        let doc = storage::read_backup(&self.path)?;

        let version = doc
            .get("version")
            .and_then(Value::as_u64)
            .unwrap_or(FORMAT_VERSION);
        if version != FORMAT_VERSION {
            return Ok(None);
        }

        match doc.get(formula) {
            Some(value) => Ok(serde_json::from_value(value.clone()).ok()),
            None => Ok(None),
        }
    }

    /// Record for this exact computation, or None (stale records and
    /// parameter mismatches silently fall back to a fresh sweep).
    pub fn try_resume(
        &self,
        formula: &str,
        x: &Integer,
        y: u64,
        sieve_limit: u64,
    ) -> Result<Option<CheckpointRecord>, PixError> {
        match self.load(formula)? {
            Some(record) if record.matches(x, y, sieve_limit) => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    /// Write a record unconditionally.
    pub fn save(&mut self, formula: &str, record: &CheckpointRecord) -> Result<(), PixError> {
        let mut doc = storage::read_backup(&self.path)?;
        if !doc.is_object() {
            doc = Value::Object(serde_json::Map::new());
        }
        let obj = doc.as_object_mut().unwrap();
        obj.insert("version".into(), Value::from(FORMAT_VERSION));
        obj.insert(formula.into(), serde_json::to_value(record)?);

        storage::write_backup(&self.path, &doc)?;
        self.last_write = Some(Instant::now());
        Ok(())
    }

    /// Write a record only if the backup interval has elapsed since the
    /// last write. Returns whether a write happened.
    pub fn save_throttled(
        &mut self,
        formula: &str,
        record: &CheckpointRecord,
    ) -> Result<bool, PixError> {
        if let Some(last) = self.last_write {
            if last.elapsed().as_secs_f64() < BACKUP_INTERVAL_SECS {
                return Ok(false);
            }
        }
        self.save(formula, record)?;
        Ok(true)
    }

    /// Start the throttle interval now (called at sweep start so the first
    /// throttled write lands a full interval in).
    pub fn reset_throttle(&mut self) {
        self.last_write = Some(Instant::now());
    }

    /// Drop a formula's record, e.g. when its parameters no longer match.
    pub fn remove(&mut self, formula: &str) -> Result<(), PixError> {
        let mut doc = storage::read_backup(&self.path)?;
        if let Some(obj) = doc.as_object_mut() {
            if obj.remove(formula).is_some() {
                storage::write_backup(&self.path, &doc)?;
            }
        }
        Ok(())
    }
}

impl Default for CheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;
    use std::path::Path;

    fn temp_store_for_test(test_name: &str) -> CheckpointStore {
        let mut path = env::temp_dir();
        path.push(format!("pix_checkpoint_test_{}", test_name));
        let _ = fs::remove_dir_all(&path);
        path.push("backup.json");
        CheckpointStore::at(path)
    }

    fn cleanup(store: &CheckpointStore) {
        if let Some(dir) = store.path.parent() {
            let _ = fs::remove_dir_all(dir);
        }
    }

    fn sample_record() -> CheckpointRecord {
        CheckpointRecord::in_flight(
            &Integer::from(10_u64.pow(12)),
            13_572,
            73_680_812,
            5_000_000,
            1 << 24,
            348_512,
            &Integer::from_str_radix("123456789012345678901234567890", 10).unwrap(),
            42.5,
            1_234.5,
        )
    }

    #[test]
    fn test_save_load_try_resume_round_trip() {
        let mut store = temp_store_for_test("round_trip");
        let record = sample_record();
        store.save("P2", &record).expect("should save");

        let loaded = store.load("P2").expect("should load").expect("record");
        assert_eq!(loaded, record);

        let x = Integer::from(10_u64.pow(12));
        let resumed = store
            .try_resume("P2", &x, 13_572, 73_680_812)
            .expect("should resume")
            .expect("matching record");
        assert_eq!(resumed, record);
        assert_eq!(
            resumed.sum_value().unwrap(),
            Integer::from_str_radix("123456789012345678901234567890", 10).unwrap()
        );

        cleanup(&store);
    }

    #[test]
    fn test_mismatched_key_is_not_resumable() {
        let mut store = temp_store_for_test("mismatch");
        store.save("P2", &sample_record()).expect("should save");

        let x = Integer::from(10_u64.pow(12));
        // Wrong y
        assert!(store.try_resume("P2", &x, 999, 73_680_812).unwrap().is_none());
        // Wrong sieve limit
        assert!(store.try_resume("P2", &x, 13_572, 1).unwrap().is_none());
        // Wrong x
        let other_x = Integer::from(10_u64.pow(13));
        assert!(
            store
                .try_resume("P2", &other_x, 13_572, 73_680_812)
                .unwrap()
                .is_none()
        );
        // Wrong formula name entirely
        assert!(store.try_resume("B", &x, 13_572, 73_680_812).unwrap().is_none());

        cleanup(&store);
    }

    #[test]
    fn test_completed_record() {
        let mut store = temp_store_for_test("completed");
        let x = Integer::from(1_000_000);
        let sum = Integer::from(987_654_321);
        let record = CheckpointRecord::completed(&x, 100, 10_000, &sum, 7.25);
        assert!(record.is_complete());
        assert_eq!(record.percent, 100.0);

        store.save("B", &record).expect("should save");
        let loaded = store.load("B").unwrap().unwrap();
        assert!(loaded.is_complete());
        assert!(loaded.low.is_none());
        assert!(loaded.thread_distance.is_none());
        assert_eq!(loaded.sum_value().unwrap(), sum);

        cleanup(&store);
    }

    #[test]
    fn test_records_for_other_formulas_survive_saves() {
        let mut store = temp_store_for_test("two_formulas");
        let p2 = sample_record();
        let b = CheckpointRecord::completed(&Integer::from(99), 3, 33, &Integer::from(7), 0.5);
        store.save("P2", &p2).unwrap();
        store.save("B", &b).unwrap();

        assert_eq!(store.load("P2").unwrap().unwrap(), p2);
        assert_eq!(store.load("B").unwrap().unwrap(), b);

        store.remove("P2").unwrap();
        assert!(store.load("P2").unwrap().is_none());
        assert_eq!(store.load("B").unwrap().unwrap(), b);

        cleanup(&store);
    }

    #[test]
    fn test_unknown_version_is_a_fresh_start() {
        let mut store = temp_store_for_test("version");
        store.save("P2", &sample_record()).unwrap();

        // Bump the document version behind the store's back
        let mut doc = storage::read_backup(&store.path).unwrap();
        doc["version"] = Value::from(FORMAT_VERSION + 1);
        storage::write_backup(&store.path, &doc).unwrap();

        assert!(store.load("P2").unwrap().is_none());

        cleanup(&store);
    }

    #[test]
    fn test_garbled_record_is_a_fresh_start() {
        let mut store = temp_store_for_test("garbled");
        store.save("P2", &sample_record()).unwrap();

        let mut doc = storage::read_backup(&store.path).unwrap();
        doc["P2"] = serde_json::json!({ "unexpected": true });
        storage::write_backup(&store.path, &doc).unwrap();

        assert!(store.load("P2").unwrap().is_none());

        cleanup(&store);
    }

    #[test]
    fn test_throttled_saves() {
        let mut store = temp_store_for_test("throttle");
        let record = sample_record();

        // Nothing written yet: the first throttled save goes through
        assert!(store.save_throttled("P2", &record).unwrap());
        // Immediately after, the interval has not elapsed
        assert!(!store.save_throttled("P2", &record).unwrap());

        // After reset_throttle the interval restarts
        store.reset_throttle();
        assert!(!store.save_throttled("P2", &record).unwrap());

        cleanup(&store);
    }
}
