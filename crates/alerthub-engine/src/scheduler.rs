//! Per-rule evaluation scheduler.
//!
//! One long-lived task per enabled rule with a non-empty query, each on a
//! fixed-instant schedule (`t_n = t_0 + n * interval`, skipping ahead when
//! an evaluation overruns). A reload pass every five minutes picks up
//! created, changed and deleted rules.

use crate::engine::NotificationEngine;
use crate::state::{SeriesState, StateCache};
use crate::thresholds::{match_threshold, parse_thresholds};
use alerthub_common::duration::parse_duration;
use alerthub_common::types::{AlertStatus, Severity};
use alerthub_common::{fingerprint, id};
use alerthub_query::{supports_pull, PrometheusClient, QuerySeries};
use alerthub_storage::{AlertRow, AlertStore, DatasourceRow, RuleRow};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

pub const RULE_RELOAD_INTERVAL: Duration = Duration::from_secs(300);
pub const EVALUATION_DEADLINE: Duration = Duration::from_secs(30);
const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// A stable series is re-handed to the engine after this long, giving the
/// send-interval policy a chance to re-notify.
const STABLE_REPROCESS_SECS: i64 = 60;

pub struct Scheduler {
    store: Arc<AlertStore>,
    engine: Arc<NotificationEngine>,
    state: StateCache,
    tasks: Mutex<HashMap<i64, RuleTask>>,
    shutdown: watch::Sender<bool>,
}

struct RuleTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Evaluation interval with a one-minute floor; unparseable values also
/// fall back to one minute.
fn check_interval(raw: &str) -> Duration {
    let parsed = parse_duration(raw)
        .and_then(|d| d.to_std().ok())
        .unwrap_or(MIN_CHECK_INTERVAL);
    parsed.max(MIN_CHECK_INTERVAL)
}

/// Round to 2 decimals (half away from zero) so tiny fluctuations do not
/// count as value changes.
fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Short series label for alert titles: `instance`, else `__name__`,
/// else `"unknown"`.
fn short_label(labels: &HashMap<String, String>) -> String {
    if let Some(v) = labels.get("instance") {
        return v.clone();
    }
    if let Some(v) = labels.get("__name__") {
        return v.clone();
    }
    "unknown".to_string()
}

impl Scheduler {
    pub fn new(store: Arc<AlertStore>, engine: Arc<NotificationEngine>) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            store,
            engine,
            state: StateCache::new(),
            tasks: Mutex::new(HashMap::new()),
            shutdown,
        })
    }

    /// Load rules, start their evaluation tasks, and start the reload
    /// ticker.
    pub async fn start(self: &Arc<Self>) {
        tracing::info!("rule scheduler starting");
        self.load_rules().await;

        let sched = self.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut tick = time::interval(RULE_RELOAD_INTERVAL);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = tick.tick() => sched.load_rules().await,
                    _ = shutdown.changed() => break,
                }
            }
        });
    }

    /// Signal every evaluation task, wait for them to finish, and clear
    /// the task table and state cache.
    pub async fn stop(&self) {
        tracing::info!("rule scheduler stopping");
        let _ = self.shutdown.send(true);

        let mut tasks = self.tasks.lock().await;
        for (rule_id, task) in tasks.drain() {
            let _ = task.stop.send(true);
            if let Err(e) = task.handle.await {
                tracing::warn!(rule_id, error = %e, "evaluation task ended abnormally");
            }
        }
        self.state.clear();
    }

    /// Evaluate one rule out of band, non-blocking. Used after admin
    /// create/update so a new rule runs without waiting for its interval.
    pub fn run_rule_now(self: &Arc<Self>, rule_id: i64) {
        let sched = self.clone();
        tokio::spawn(async move {
            let rule = match sched.store.get_rule(rule_id).await {
                Ok(Some(rule)) => rule,
                Ok(None) => {
                    tracing::warn!(rule_id, "run_rule_now: rule not found");
                    return;
                }
                Err(e) => {
                    tracing::error!(rule_id, error = %e, "run_rule_now: rule lookup failed");
                    return;
                }
            };
            if !rule.enabled || rule.query_expression.is_empty() {
                return;
            }
            sched.evaluate_rule(&rule).await;
            sched.touch_last_run(rule_id).await;
        });
    }

    async fn touch_last_run(&self, rule_id: i64) {
        if let Err(e) = self.store.touch_rule_last_run(rule_id, Utc::now()).await {
            tracing::warn!(rule_id, error = %e, "failed to update last_run_at");
        }
    }

    /// Reconcile the task table with the schedulable rule set: launch
    /// tasks for new rules, stop tasks whose rule is gone. Never
    /// double-schedules.
    async fn load_rules(self: &Arc<Self>) {
        let rules = match self.store.list_schedulable_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(error = %e, "failed to load rules");
                return;
            }
        };

        let mut tasks = self.tasks.lock().await;
        let mut current: HashSet<i64> = HashSet::new();
        for rule in rules {
            current.insert(rule.id);
            if tasks.contains_key(&rule.id) {
                continue;
            }
            let interval = check_interval(&rule.check_interval);
            let (stop_tx, stop_rx) = watch::channel(false);
            let sched = self.clone();
            let rule_id = rule.id;
            let handle = tokio::spawn(async move {
                sched.run_task(rule, interval, stop_rx).await;
            });
            tasks.insert(rule_id, RuleTask { stop: stop_tx, handle });
            tracing::info!(rule_id, interval_secs = interval.as_secs(), "scheduled rule");
        }

        tasks.retain(|rule_id, task| {
            if current.contains(rule_id) {
                return true;
            }
            let _ = task.stop.send(true);
            tracing::info!(rule_id, "stopped rule task");
            false
        });
    }

    async fn run_task(
        self: Arc<Self>,
        rule: RuleRow,
        interval: Duration,
        mut stop: watch::Receiver<bool>,
    ) {
        let rule_id = rule.id;
        self.evaluate_rule(&rule).await;
        self.touch_last_run(rule_id).await;

        let mut next_run = Instant::now() + interval;
        loop {
            tokio::select! {
                _ = time::sleep_until(next_run) => {
                    next_run += interval;
                    if Instant::now() > next_run {
                        next_run = Instant::now() + interval;
                    }
                    // Re-read the rule so disable/edit takes effect without
                    // waiting for the reload pass.
                    let current = match self.store.get_rule(rule_id).await {
                        Ok(Some(rule)) => rule,
                        Ok(None) => {
                            tracing::info!(rule_id, "rule deleted, stopping task");
                            return;
                        }
                        Err(e) => {
                            tracing::error!(rule_id, error = %e, "rule reload failed");
                            continue;
                        }
                    };
                    if !current.enabled || current.query_expression.is_empty() {
                        tracing::info!(rule_id, "rule disabled or query cleared, stopping task");
                        return;
                    }
                    self.evaluate_rule(&current).await;
                    self.touch_last_run(rule_id).await;
                }
                _ = stop.changed() => return,
            }
        }
    }

    /// One evaluation: resolve the rule's first datasource, query it, and
    /// feed the results through the state cache.
    async fn evaluate_rule(&self, rule: &RuleRow) {
        let Some(datasource_id) = rule.first_datasource_id() else {
            tracing::warn!(rule_id = rule.id, "rule has no datasource");
            return;
        };
        let datasource = match self.store.get_datasource(datasource_id).await {
            Ok(Some(ds)) => ds,
            Ok(None) => {
                tracing::warn!(rule_id = rule.id, datasource_id, "datasource not found");
                return;
            }
            Err(e) => {
                tracing::error!(rule_id = rule.id, error = %e, "datasource lookup failed");
                return;
            }
        };
        if !datasource.enabled {
            tracing::debug!(rule_id = rule.id, datasource_id, "datasource disabled");
            return;
        }
        if !supports_pull(&datasource.source_type) {
            tracing::warn!(
                rule_id = rule.id,
                source_type = %datasource.source_type,
                "unsupported datasource type for pull evaluation"
            );
            return;
        }

        let client = PrometheusClient::new(&datasource.endpoint);
        let series =
            match time::timeout(EVALUATION_DEADLINE, client.query(&rule.query_expression)).await {
                Ok(Ok(series)) => series,
                Ok(Err(e)) => {
                    tracing::warn!(rule_id = rule.id, rule_name = %rule.name, error = %e, "query failed");
                    return;
                }
                Err(_) => {
                    tracing::warn!(rule_id = rule.id, "query deadline exceeded");
                    return;
                }
            };
        self.process_series(rule, &datasource, &series).await;
    }

    /// Turn one query snapshot into alert upserts and resolutions.
    ///
    /// A series is (re-)processed when it is new, its rounded value
    /// changed, or it has been stable for [`STABLE_REPROCESS_SECS`].
    /// Fingerprints absent from the snapshot accumulate misses and
    /// resolve after the grace period.
    pub(crate) async fn process_series(
        &self,
        rule: &RuleRow,
        datasource: &DatasourceRow,
        series: &[QuerySeries],
    ) {
        let entry = self.state.rule_state(rule.id);
        let mut state = entry.lock().await;

        if !series.is_empty() {
            tracing::debug!(
                rule_id = rule.id,
                rule_name = %rule.name,
                count = series.len(),
                "query returned series"
            );
        }

        let thresholds = parse_thresholds(&rule.thresholds);
        let mut current_keys: HashSet<String> = HashSet::new();

        for (index, sample) in series.iter().enumerate() {
            let labels = &sample.labels;
            let value = sample.sample_value();

            let mut severity = if rule.match_severity.is_empty() {
                Severity::Warning.to_string()
            } else {
                rule.match_severity.clone()
            };
            let mut annotations: HashMap<String, String> =
                HashMap::from([("value".to_string(), format!("{value}"))]);

            if let Some(levels) = &thresholds {
                // First matching level wins; no match means this series is
                // normal and its absence below drives resolution.
                let Some(level) = match_threshold(levels, value) else {
                    continue;
                };
                severity = if level.severity.is_empty() {
                    Severity::Warning.to_string()
                } else {
                    level.severity.clone()
                };
                if !level.channel_ids.is_empty() {
                    if let Ok(channels_json) = serde_json::to_string(&level.channel_ids) {
                        annotations.insert("threshold_channel_ids".to_string(), channels_json);
                    }
                }
            }

            let title = format!("{}: {}", rule.name, short_label(labels));
            let key = fingerprint::series_key(datasource.id, rule.id, &title, labels, index);
            current_keys.insert(key.clone());

            let (had_previous, prev_alert_id, prev_value, prev_processed_at, prev_miss) =
                match state.series.get(&key) {
                    Some(p) => (true, p.alert_id.clone(), p.value, p.processed_at, p.miss_count),
                    None => (false, String::new(), 0.0, Utc::now(), 0),
                };

            let value_changed = !had_previous || round2(prev_value) != round2(value);
            let needs_reprocess = had_previous
                && !value_changed
                && !prev_alert_id.is_empty()
                && (Utc::now() - prev_processed_at).num_seconds() >= STABLE_REPROCESS_SECS;

            if !value_changed && !needs_reprocess {
                if prev_miss > 0 {
                    state.reset_miss(&key);
                }
                continue;
            }

            let mut alert_id = prev_alert_id;
            if alert_id.is_empty() {
                // In-memory state is lost on restart; adopt a still-firing
                // row for the same series before minting a new ID.
                alert_id = match self.store.find_firing_alert(datasource.id, &key).await {
                    Ok(Some(existing)) => existing.id,
                    Ok(None) => id::next_id(),
                    Err(e) => {
                        tracing::error!(rule_id = rule.id, error = %e, "firing alert lookup failed");
                        continue;
                    }
                };
            }

            let now = Utc::now();
            let mut alert = AlertRow {
                id: alert_id.clone(),
                source_id: datasource.id,
                source_type: datasource.source_type.clone(),
                external_id: key.clone(),
                title,
                severity: severity.clone(),
                status: AlertStatus::Firing.as_str().to_string(),
                firing_at: now,
                resolved_at: None,
                labels: serde_json::to_string(labels).unwrap_or_else(|_| "{}".to_string()),
                annotations: serde_json::to_string(&annotations)
                    .unwrap_or_else(|_| "{}".to_string()),
                created_at: now,
                updated_at: now,
            };
            match self.store.get_alert(&alert_id).await {
                Ok(Some(existing)) => {
                    // Keep the episode start so duration gating holds
                    // across updates.
                    alert.firing_at = existing.firing_at;
                    alert.created_at = existing.created_at;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(rule_id = rule.id, error = %e, "alert lookup failed");
                    continue;
                }
            }
            if let Err(e) = self.store.upsert_alert(&alert).await {
                tracing::error!(
                    rule_id = rule.id,
                    alert_id = %alert.id,
                    error = %e,
                    "failed to persist alert"
                );
                continue;
            }

            // Notification delivery (rate limiters, HTTP) must not block
            // the evaluation loop.
            self.engine.process_async(&alert);

            state.observe(
                key,
                SeriesState {
                    labels: labels.clone(),
                    value,
                    processed_at: Utc::now(),
                    alert_id: alert_id.clone(),
                    severity,
                    miss_count: 0,
                },
            );
            if had_previous {
                tracing::debug!(rule_id = rule.id, alert_id = %alert_id, value, "updated firing series");
            } else {
                tracing::info!(rule_id = rule.id, alert_id = %alert_id, value, "new firing series");
            }
        }

        for (key, alert_id) in state.expire_absent(&current_keys) {
            if alert_id.is_empty() {
                continue;
            }
            let alert = match self.store.get_alert(&alert_id).await {
                Ok(Some(alert)) => alert,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(rule_id = rule.id, alert_id = %alert_id, error = %e, "alert lookup failed");
                    continue;
                }
            };
            if alert.status != AlertStatus::Firing.as_str() {
                continue;
            }
            let mut resolved = alert;
            resolved.status = AlertStatus::Resolved.as_str().to_string();
            resolved.resolved_at = Some(Utc::now());
            if let Err(e) = self.store.upsert_alert(&resolved).await {
                tracing::error!(rule_id = rule.id, alert_id = %resolved.id, error = %e, "failed to resolve alert");
                continue;
            }
            self.engine.process_async(&resolved);
            tracing::info!(
                rule_id = rule.id,
                alert_id = %resolved.id,
                series = %key,
                "resolved absent series"
            );
        }

        state.last_check = Some(Utc::now());
    }
}

#[cfg(test)]
mod interval_tests {
    use super::*;

    #[test]
    fn check_interval_floor_and_default() {
        assert_eq!(check_interval("5m"), Duration::from_secs(300));
        assert_eq!(check_interval("30s"), Duration::from_secs(60));
        assert_eq!(check_interval(""), Duration::from_secs(60));
        assert_eq!(check_interval("garbage"), Duration::from_secs(60));
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        // 0.125 is exact in binary, so the tie is a true .5 case.
        assert_eq!(round2(0.125), 0.13);
        assert_eq!(round2(-0.125), -0.13);
        assert_eq!(round2(95.0), 95.0);
        assert_eq!(round2(95.001), round2(95.004));
        assert_ne!(round2(95.004), round2(95.011));
    }

    #[test]
    fn short_label_preference_order() {
        let mut labels = HashMap::new();
        assert_eq!(short_label(&labels), "unknown");
        labels.insert("__name__".to_string(), "up".to_string());
        assert_eq!(short_label(&labels), "up");
        labels.insert("instance".to_string(), "h1:9100".to_string());
        assert_eq!(short_label(&labels), "h1:9100");
    }
}
