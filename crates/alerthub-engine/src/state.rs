//! Per-rule series state: the volatile memory that turns a stream of query
//! snapshots into firing/resolved transitions.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

/// Consecutive absent evaluations before a firing series resolves.
/// Absorbs transient scrape gaps that would otherwise cause flapping.
pub const RESOLVE_GRACE_PERIOD: u32 = 3;

/// Last-seen snapshot of one series under one rule.
pub struct SeriesState {
    pub labels: HashMap<String, String>,
    pub value: f64,
    /// When the series was last handed to the notification engine.
    pub processed_at: DateTime<Utc>,
    pub alert_id: String,
    pub severity: String,
    pub miss_count: u32,
}

/// All series state for one rule, keyed by fingerprint. The scheduler
/// holds the entry lock for the full evaluation of that rule.
#[derive(Default)]
pub struct RuleState {
    pub series: HashMap<String, SeriesState>,
    pub last_check: Option<DateTime<Utc>>,
}

impl RuleState {
    /// Record a processed sighting; resets the miss counter.
    pub fn observe(&mut self, key: String, state: SeriesState) {
        self.series.insert(key, state);
    }

    /// Series reappeared before the grace period ran out.
    pub fn reset_miss(&mut self, key: &str) {
        if let Some(entry) = self.series.get_mut(key) {
            entry.miss_count = 0;
        }
    }

    /// Bump the miss counter of every tracked series not in `current`.
    /// Entries reaching [`RESOLVE_GRACE_PERIOD`] are removed and returned
    /// as `(fingerprint, alert_id)` pairs for the caller to resolve.
    pub fn expire_absent(&mut self, current: &HashSet<String>) -> Vec<(String, String)> {
        let mut due = Vec::new();
        self.series.retain(|key, entry| {
            if current.contains(key) {
                return true;
            }
            entry.miss_count += 1;
            if entry.miss_count < RESOLVE_GRACE_PERIOD {
                tracing::debug!(
                    alert_id = %entry.alert_id,
                    miss = entry.miss_count,
                    grace = RESOLVE_GRACE_PERIOD,
                    "series absent, waiting before resolve"
                );
                return true;
            }
            due.push((key.clone(), entry.alert_id.clone()));
            false
        });
        due
    }
}

/// Process-wide map from rule ID to its series state. The outer lock only
/// guards the map; per-rule work happens under the entry's own mutex, and
/// entry holders never re-enter the outer lock.
pub struct StateCache {
    inner: RwLock<HashMap<i64, Arc<Mutex<RuleState>>>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the state entry for a rule, creating it on first touch.
    pub fn rule_state(&self, rule_id: i64) -> Arc<Mutex<RuleState>> {
        if let Some(entry) = self.inner.read().unwrap().get(&rule_id) {
            return entry.clone();
        }
        self.inner
            .write()
            .unwrap()
            .entry(rule_id)
            .or_insert_with(|| Arc::new(Mutex::new(RuleState::default())))
            .clone()
    }

    pub fn clear(&self) {
        self.inner.write().unwrap().clear();
    }
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new()
    }
}
