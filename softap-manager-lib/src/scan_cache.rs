use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use crate::mac_address::MacAddress;

/// Running store of scan results merged by BSSID, with age-based eviction.
///
/// Thread-safe: one mutex guards both operations and is never held across anything that could
/// call back into the manager.  Timestamps are elapsed-since-boot milliseconds from the same
/// monotonic source the update path uses, so entries age consistently regardless of wall
/// clock changes.
#[derive(Debug)]
pub struct ScanCache {
  results_by_bssid: Mutex<HashMap<MacAddress, ScanRecord>>,
  max_age: Duration,
  booted_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
  pub bssid: MacAddress,
  pub timestamp_ms: u64,
  pub payload: Vec<u8>,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
#[error("Requested max age {requested:?} exceeds the configured bound {configured:?}")]
pub struct ScanAgeError {
  requested: Duration,
  configured: Duration,
}

impl Default for ScanCache {
  fn default() -> Self {
    Self::new()
  }
}

impl ScanCache {
  /// Creates a cache with no age bound.
  pub fn new() -> Self {
    Self::with_max_age(Duration::MAX)
  }

  /// Creates a cache that prunes entries older than `max_age` on update and caps the age
  /// window snapshots may request.
  pub fn with_max_age(max_age: Duration) -> Self {
    Self {
      results_by_bssid: Mutex::new(HashMap::new()),
      max_age,
      booted_at: Instant::now(),
    }
  }

  /// Merges a batch of results.  Stale entries are evicted first; an incoming result replaces
  /// the stored one only when its timestamp is strictly newer, which keeps the outcome
  /// deterministic under duplicate frames.
  pub fn update(&self, new_results: impl IntoIterator<Item = ScanRecord>) {
    self.update_at(self.now_ms(), new_results);
  }

  fn update_at(&self, now_ms: u64, new_results: impl IntoIterator<Item = ScanRecord>) {
    let max_age_ms = as_millis_saturating(self.max_age);
    let mut results = self.results_by_bssid.lock().unwrap();
    results.retain(|_, record| now_ms.saturating_sub(record.timestamp_ms) <= max_age_ms);
    for result in new_results {
      match results.get(&result.bssid) {
        Some(stored) if stored.timestamp_ms >= result.timestamp_ms => {}
        _ => {
          results.insert(result.bssid, result);
        }
      }
    }
  }

  /// Returns copies of all entries no older than `max_age`, which must not exceed the bound
  /// the cache was configured with.
  pub fn snapshot(&self, max_age: Duration) -> Result<Vec<ScanRecord>, ScanAgeError> {
    self.snapshot_at(self.now_ms(), max_age)
  }

  fn snapshot_at(&self, now_ms: u64, max_age: Duration) -> Result<Vec<ScanRecord>, ScanAgeError> {
    if max_age > self.max_age {
      return Err(ScanAgeError {
        requested: max_age,
        configured: self.max_age,
      });
    }
    let max_age_ms = as_millis_saturating(max_age);
    let results = self.results_by_bssid.lock().unwrap();
    Ok(results.values()
        .filter(|record| now_ms.saturating_sub(record.timestamp_ms) <= max_age_ms)
        .cloned()
        .collect())
  }

  fn now_ms(&self) -> u64 {
    as_millis_saturating(self.booted_at.elapsed())
  }
}

fn as_millis_saturating(duration: Duration) -> u64 {
  u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
