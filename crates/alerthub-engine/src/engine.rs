//! The notification engine: matches persisted alerts against enabled rules
//! and applies every dispatch policy before handing off to channel senders.

use crate::aggregation;
use alerthub_common::duration::parse_duration;
use alerthub_common::types::AlertStatus;
use alerthub_notify::jira::{self, JiraConfig};
use alerthub_notify::template::{render_body, render_template, AlertTemplateData};
use alerthub_notify::SenderRegistry;
use alerthub_storage::{AlertRow, AlertStore, RuleRow};
use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Bounded work queue in front of the worker pool. When full, processing
/// falls back to a detached task so producers never block and alerts are
/// never dropped.
pub const NOTIFY_QUEUE_CAPACITY: usize = 500;
pub const NOTIFY_WORKERS: usize = 8;

/// Lookback for cross-rule recovery dedup on the send-record log.
const RECOVERY_DEDUP_WINDOW_SECS: i64 = 120;

const SYSTEM_ALERT_PREFIX: &str = "【系统告警】";

const MINIMAL_BODY: &str = "AlertID: {{.AlertID}}\nTitle: {{.Title}}\nSeverity: {{.Severity}}";

#[derive(Debug, Clone, Deserialize)]
struct SuppressionConfig {
    #[serde(default)]
    source_labels: HashMap<String, String>,
    #[serde(default)]
    suppressed_labels: HashMap<String, String>,
    #[serde(default)]
    duration: String,
}

#[derive(Deserialize)]
struct ExcludeWindow {
    #[serde(default)]
    start: String,
    #[serde(default)]
    end: String,
}

pub struct NotificationEngine {
    store: Arc<AlertStore>,
    senders: Arc<SenderRegistry>,
    /// Zone used for exclude windows and rendered timestamps.
    tz: FixedOffset,
    queue: mpsc::Sender<AlertRow>,
    /// rule ID -> suppression window expiry.
    suppression: Mutex<HashMap<i64, DateTime<Utc>>>,
    /// (rule ID, type fingerprint) -> last aggregated send.
    agg_last_sent: Mutex<HashMap<(i64, String), DateTime<Utc>>>,
    /// Recent successful sends, cached so recovery dedup usually avoids
    /// the send-record query; the table stays authoritative.
    recent_sends: Mutex<HashMap<(String, i64), DateTime<Utc>>>,
}

impl NotificationEngine {
    /// Build the engine and start its worker pool.
    pub fn new(
        store: Arc<AlertStore>,
        senders: Arc<SenderRegistry>,
        tz: FixedOffset,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<AlertRow>(NOTIFY_QUEUE_CAPACITY);
        let engine = Arc::new(Self {
            store,
            senders,
            tz,
            queue: tx,
            suppression: Mutex::new(HashMap::new()),
            agg_last_sent: Mutex::new(HashMap::new()),
            recent_sends: Mutex::new(HashMap::new()),
        });

        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        for worker in 0..NOTIFY_WORKERS {
            let engine = engine.clone();
            let rx = rx.clone();
            tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    match job {
                        Some(alert) => engine.process(&alert).await,
                        None => break,
                    }
                }
                tracing::debug!(worker, "notification worker exited");
            });
        }
        engine
    }

    /// Enqueue an alert for processing. Non-blocking: a saturated queue
    /// falls back to a detached task instead of dropping the alert.
    pub fn process_async(self: &Arc<Self>, alert: &AlertRow) {
        match self.queue.try_send(alert.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(alert)) => {
                tracing::warn!(alert_id = %alert.id, "notification queue full, processing in detached task");
                let engine = self.clone();
                tokio::spawn(async move {
                    engine.process(&alert).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    /// Run the full policy pipeline for one alert against every enabled
    /// rule in priority order. All failures are local: a bad rule, channel
    /// or send never aborts processing of its siblings.
    pub async fn process(&self, alert: &AlertRow) {
        match self.store.has_active_silence(&alert.id, Utc::now()).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                tracing::error!(alert_id = %alert.id, error = %e, "silence lookup failed");
                return;
            }
        }

        let rules = match self.store.list_enabled_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(error = %e, "failed to load rules");
                return;
            }
        };

        let labels: HashMap<String, String> =
            serde_json::from_str(&alert.labels).unwrap_or_default();

        for rule in &rules {
            // Source-condition matches arm the window even when this rule
            // does not fire for the alert.
            self.arm_suppression(rule, &labels);

            if !match_rule(rule, alert, &labels) {
                continue;
            }

            // Per-threshold channels (carried via annotations) win over the
            // rule's own channel list.
            let mut channel_ids: Vec<i64> = annotation_value(alert, "threshold_channel_ids")
                .and_then(|raw| serde_json::from_str(&raw).ok())
                .unwrap_or_default();
            if channel_ids.is_empty() {
                channel_ids = rule.channel_id_list();
            }
            if channel_ids.is_empty() {
                continue;
            }

            if alert.status == AlertStatus::Resolved.as_str() && rule.recovery_notify {
                self.send_recovery(rule, alert, &labels, &channel_ids).await;
                continue;
            }
            if alert.status != AlertStatus::Firing.as_str() {
                continue;
            }

            if !duration_satisfied(rule, alert) {
                continue;
            }
            if self.in_exclude_window(rule) {
                continue;
            }
            if self.is_suppressed(rule, &labels) {
                continue;
            }

            let send_at = Utc::now();
            let body = format!(
                "{}\n\n发送时间: {}",
                self.resolve_body(rule, alert, &labels, false, send_at).await,
                self.format_local(send_at)
            );
            let mut title = strip_system_alert_prefix(&alert.title).to_string();
            if title.is_empty() {
                title = "Alert".to_string();
            }

            self.try_create_jira_ticket(rule, alert, &title, &body).await;

            if rule.aggregation_enabled
                && !rule.aggregate_by.is_empty()
                && !rule.aggregate_window.is_empty()
            {
                self.send_aggregated(rule, alert, &labels, &title, &body, &channel_ids)
                    .await;
            } else {
                for &channel_id in &channel_ids {
                    if self.send_rate_limited(rule, &alert.id, channel_id).await {
                        continue;
                    }
                    self.dispatch(&alert.id, channel_id, &title, &body, false)
                        .await;
                }
            }
        }
    }

    /// Recovery notifications go out without an extra title and are
    /// deduplicated across rules via the send-record log.
    async fn send_recovery(
        &self,
        rule: &RuleRow,
        alert: &AlertRow,
        labels: &HashMap<String, String>,
        channel_ids: &[i64],
    ) {
        let send_at = Utc::now();
        let body = format!(
            "{}\n\n发送时间: {}",
            self.resolve_body(rule, alert, labels, true, send_at).await,
            self.format_local(send_at)
        );
        for &channel_id in channel_ids {
            if self.recovery_already_sent(&alert.id, channel_id).await {
                continue;
            }
            self.dispatch(&alert.id, channel_id, "", &body, true).await;
        }
    }

    /// Deliver to one channel and log the outcome. Returns true on success.
    async fn dispatch(
        &self,
        alert_id: &str,
        channel_id: i64,
        title: &str,
        body: &str,
        is_recovery: bool,
    ) -> bool {
        let channel = match self.store.get_channel(channel_id).await {
            Ok(Some(ch)) if ch.enabled => ch,
            Ok(_) => {
                self.record_send(alert_id, channel_id, false, Some("channel not found or disabled"))
                    .await;
                return false;
            }
            Err(e) => {
                tracing::error!(channel_id, error = %e, "channel lookup failed");
                self.record_send(alert_id, channel_id, false, Some("channel lookup failed"))
                    .await;
                return false;
            }
        };

        match self
            .senders
            .send(&channel.channel_type, &channel.config, title, body, is_recovery)
            .await
        {
            Ok(()) => {
                self.record_send(alert_id, channel_id, true, None).await;
                self.note_send_success(alert_id, channel_id);
                true
            }
            Err(e) => {
                tracing::warn!(
                    alert_id,
                    channel_id,
                    channel_type = %channel.channel_type,
                    error = %e,
                    "send failed"
                );
                self.record_send(alert_id, channel_id, false, Some(&e.to_string()))
                    .await;
                false
            }
        }
    }

    async fn record_send(
        &self,
        alert_id: &str,
        channel_id: i64,
        success: bool,
        error: Option<&str>,
    ) {
        if let Err(e) = self
            .store
            .append_send_record(alert_id, channel_id, success, error)
            .await
        {
            tracing::error!(alert_id, channel_id, error = %e, "failed to append send record");
        }
    }

    fn note_send_success(&self, alert_id: &str, channel_id: i64) {
        self.recent_sends
            .lock()
            .unwrap()
            .insert((alert_id.to_string(), channel_id), Utc::now());
    }

    /// A successful send to this channel within the dedup window means
    /// another rule already delivered the recovery.
    async fn recovery_already_sent(&self, alert_id: &str, channel_id: i64) -> bool {
        let now = Utc::now();
        let window = Duration::seconds(RECOVERY_DEDUP_WINDOW_SECS);
        {
            let mut cache = self.recent_sends.lock().unwrap();
            cache.retain(|_, sent_at| now - *sent_at < window);
            if cache.contains_key(&(alert_id.to_string(), channel_id)) {
                return true;
            }
        }
        self.store
            .count_recent_successful_sends(alert_id, channel_id, now - window)
            .await
            .map(|n| n > 0)
            .unwrap_or(false)
    }

    /// Per-alert throttle: at most one successful send per channel per
    /// `send_interval`. Different alerts under the same rule are
    /// independent.
    async fn send_rate_limited(&self, rule: &RuleRow, alert_id: &str, channel_id: i64) -> bool {
        if rule.send_interval.is_empty() || rule.send_interval == "0" {
            return false;
        }
        let Some(interval) = parse_duration(&rule.send_interval) else {
            return false;
        };
        if interval <= Duration::zero() {
            return false;
        }
        self.store
            .count_recent_successful_sends(alert_id, channel_id, Utc::now() - interval)
            .await
            .map(|n| n > 0)
            .unwrap_or(false)
    }

    pub(crate) fn arm_suppression(&self, rule: &RuleRow, labels: &HashMap<String, String>) {
        let Some(cfg) = parse_suppression(&rule.suppression) else {
            return;
        };
        if cfg.duration.is_empty() || !labels_match(labels, &cfg.source_labels) {
            return;
        }
        let Some(window) = parse_duration(&cfg.duration) else {
            return;
        };
        self.suppression
            .lock()
            .unwrap()
            .insert(rule.id, Utc::now() + window);
    }

    pub(crate) fn is_suppressed(&self, rule: &RuleRow, labels: &HashMap<String, String>) -> bool {
        let Some(cfg) = parse_suppression(&rule.suppression) else {
            return false;
        };
        if cfg.suppressed_labels.is_empty() {
            return false;
        }
        let expiry = self.suppression.lock().unwrap().get(&rule.id).copied();
        let Some(expiry) = expiry else {
            return false;
        };
        if Utc::now() >= expiry {
            return false;
        }
        labels_match(labels, &cfg.suppressed_labels)
    }

    fn in_exclude_window(&self, rule: &RuleRow) -> bool {
        let local = Utc::now().with_timezone(&self.tz);
        windows_exclude(&rule.exclude_windows, local.hour() * 60 + local.minute())
    }

    pub(crate) fn format_local(&self, t: DateTime<Utc>) -> String {
        t.with_timezone(&self.tz)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }

    /// Resolve the notification body through the template chain: the
    /// rule's template, then the default template (auto-rebinding a
    /// dangling reference), then a hard-coded minimal body. Render errors
    /// fall back to literal placeholder substitution.
    async fn resolve_body(
        &self,
        rule: &RuleRow,
        alert: &AlertRow,
        labels: &HashMap<String, String>,
        is_recovery: bool,
        send_at: DateTime<Utc>,
    ) -> String {
        let title = strip_system_alert_prefix(&alert.title);
        let mut data = AlertTemplateData {
            alert_id: alert.id.clone(),
            title: title.to_string(),
            severity: alert.severity.clone(),
            labels: labels.clone(),
            start_at: self.format_local(alert.firing_at),
            sent_at: self.format_local(send_at),
            source_type: alert.source_type.clone(),
            is_recovery,
            rule_description: rule.description.clone(),
            ..Default::default()
        };
        if is_recovery {
            if let Some(resolved_at) = alert.resolved_at {
                data.resolved_at = self.format_local(resolved_at);
            }
        }
        if !alert.annotations.is_empty() {
            if let Ok(ann) = serde_json::from_str::<HashMap<String, String>>(&alert.annotations) {
                if let Some(d) = ann.get("description").filter(|s| !s.is_empty()) {
                    data.description = d.clone();
                }
                if data.description.is_empty() {
                    if let Some(s) = ann.get("summary").filter(|s| !s.is_empty()) {
                        data.description = s.clone();
                    }
                }
                if let Some(v) = ann.get("value").filter(|s| !s.is_empty()) {
                    data.value = v.clone();
                }
            }
        }
        // The alert title already heads the notification; only the rule's
        // description fills an empty description.
        if data.description.is_empty() && !rule.description.is_empty() {
            data.description = rule.description.clone();
        }

        if let Some(template_id) = rule.template_id.filter(|id| *id != 0) {
            match self.store.get_template(template_id).await {
                Ok(Some(t)) if !t.body.is_empty() => {
                    return self.render_with_fallback(&t.body, &data, labels, alert);
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::warn!(
                        template_id,
                        rule_id = rule.id,
                        "template not found, rebinding rule to default"
                    );
                    if let Ok(Some(default_t)) = self.store.default_template().await {
                        if let Err(e) = self
                            .store
                            .rebind_rule_template(rule.id, default_t.id)
                            .await
                        {
                            tracing::error!(rule_id = rule.id, error = %e, "failed to rebind rule template");
                        }
                        return self.render_with_fallback(&default_t.body, &data, labels, alert);
                    }
                }
                Err(e) => {
                    tracing::error!(template_id, error = %e, "template lookup failed");
                }
            }
        }

        if let Ok(Some(default_t)) = self.store.default_template().await {
            if !default_t.body.is_empty() {
                return self.render_with_fallback(&default_t.body, &data, labels, alert);
            }
        }
        render_body(MINIMAL_BODY, labels, &alert.id, title, &alert.severity)
    }

    fn render_with_fallback(
        &self,
        body: &str,
        data: &AlertTemplateData,
        labels: &HashMap<String, String>,
        alert: &AlertRow,
    ) -> String {
        match render_template(body, data) {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(error = %e, "template render failed, using literal substitution");
                render_body(body, labels, &alert.id, &data.title, &alert.severity)
            }
        }
    }

    /// Ticket gating: after the same logical alert has been recorded
    /// `jira_after_n` times, create one Jira issue per
    /// `(rule, source, external_id)`. Failures never abort delivery.
    async fn try_create_jira_ticket(
        &self,
        rule: &RuleRow,
        alert: &AlertRow,
        title: &str,
        body: &str,
    ) {
        if !rule.jira_enabled || rule.jira_after_n <= 0 || rule.jira_config.is_empty() {
            return;
        }
        let count = match self
            .store
            .count_alerts_by_external(alert.source_id, &alert.external_id)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::error!(rule_id = rule.id, error = %e, "alert occurrence count failed");
                return;
            }
        };
        if count < rule.jira_after_n as u64 {
            return;
        }
        match self
            .store
            .jira_ticket_exists(rule.id, alert.source_id, &alert.external_id)
            .await
        {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                tracing::error!(rule_id = rule.id, error = %e, "jira ticket lookup failed");
                return;
            }
        }
        let cfg: JiraConfig = match serde_json::from_str(&rule.jira_config) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(rule_id = rule.id, error = %e, "jira config parse error");
                return;
            }
        };
        let summary = truncate_summary(&format!("[Alert] {title}"));
        match jira::create_issue(&cfg, &summary, body).await {
            Ok(issue_key) => {
                tracing::info!(rule_id = rule.id, issue = %issue_key, "created jira ticket");
                if let Err(e) = self
                    .store
                    .record_jira_ticket(rule.id, alert.source_id, &alert.external_id, &issue_key)
                    .await
                {
                    tracing::error!(rule_id = rule.id, error = %e, "failed to record jira ticket");
                }
            }
            Err(e) => {
                tracing::warn!(rule_id = rule.id, error = %e, "jira issue creation failed");
            }
        }
    }

    /// Merge same-type firing alerts inside the aggregate window into one
    /// notification per `(rule, type fingerprint)` per window.
    async fn send_aggregated(
        &self,
        rule: &RuleRow,
        alert: &AlertRow,
        labels: &HashMap<String, String>,
        title: &str,
        body: &str,
        channel_ids: &[i64],
    ) {
        let window = parse_duration(&rule.aggregate_window)
            .filter(|d| *d > Duration::zero())
            .unwrap_or_else(|| Duration::minutes(5));
        let since = Utc::now() - window;
        let candidates = match self.store.list_firing_alerts_since(since).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(rule_id = rule.id, error = %e, "aggregation candidate query failed");
                return;
            }
        };
        if candidates.is_empty() {
            return;
        }

        let type_fp = aggregation::type_fingerprint(labels, &rule.aggregate_by);
        let mut trigger_key = aggregation::aggregation_key(labels, &rule.aggregate_by);
        if trigger_key.is_empty() {
            trigger_key = alert.id.clone();
        }
        let mut keys: BTreeSet<String> = BTreeSet::new();
        keys.insert(trigger_key);

        for candidate in &candidates {
            if candidate.id == alert.id {
                continue;
            }
            let Ok(candidate_labels) =
                serde_json::from_str::<HashMap<String, String>>(&candidate.labels)
            else {
                continue;
            };
            if !match_rule(rule, candidate, &candidate_labels) {
                continue;
            }
            if !aggregation::labels_same_type(labels, &candidate_labels, &rule.aggregate_by) {
                continue;
            }
            let key = aggregation::aggregation_key(&candidate_labels, &rule.aggregate_by);
            if !key.is_empty() {
                keys.insert(key);
            }
        }

        {
            let last = self
                .agg_last_sent
                .lock()
                .unwrap()
                .get(&(rule.id, type_fp.clone()))
                .copied();
            if let Some(last_sent) = last {
                if Utc::now() - last_sent < window {
                    return;
                }
            }
        }

        let dim_name = if rule.aggregate_by.is_empty() {
            "items"
        } else {
            rule.aggregate_by.as_str()
        };
        let agg_title = format!("{title} ({} {dim_name})", keys.len());
        let key_list: Vec<String> = keys.into_iter().collect();
        let agg_body = format!("{body}\n\n{dim_name} list: {}", key_list.join(", "));

        let mut any_success = false;
        for &channel_id in channel_ids {
            if self.send_rate_limited(rule, &alert.id, channel_id).await {
                continue;
            }
            if self
                .dispatch(&alert.id, channel_id, &agg_title, &agg_body, false)
                .await
            {
                any_success = true;
            }
        }
        if any_success {
            self.agg_last_sent
                .lock()
                .unwrap()
                .insert((rule.id, type_fp), Utc::now());
        }
    }
}

/// Rule matching: severity (empty = any), datasource list (empty = all),
/// and subset label matching.
pub(crate) fn match_rule(
    rule: &RuleRow,
    alert: &AlertRow,
    labels: &HashMap<String, String>,
) -> bool {
    if !rule.match_severity.is_empty() && rule.match_severity != alert.severity {
        return false;
    }
    let datasource_ids = rule.datasource_id_list();
    if !datasource_ids.is_empty() && !datasource_ids.contains(&alert.source_id) {
        return false;
    }
    rule.match_label_map()
        .iter()
        .all(|(k, v)| labels.get(k) == Some(v))
}

pub(crate) fn duration_satisfied(rule: &RuleRow, alert: &AlertRow) -> bool {
    if rule.duration.is_empty() || rule.duration == "0" {
        return true;
    }
    let Some(required) = parse_duration(&rule.duration) else {
        return true;
    };
    Utc::now() - alert.firing_at >= required
}

/// All pairs of `want` present in `labels`; an empty `want` never matches.
/// (Unlike rule label matching, where empty means "no constraint".)
pub(crate) fn labels_match(
    labels: &HashMap<String, String>,
    want: &HashMap<String, String>,
) -> bool {
    !want.is_empty() && want.iter().all(|(k, v)| labels.get(k) == Some(v))
}

fn parse_suppression(raw: &str) -> Option<SuppressionConfig> {
    if raw.is_empty() {
        return None;
    }
    serde_json::from_str(raw).ok()
}

/// Minute-of-day check against the rule's exclude windows.
/// `start <= end` is a same-day `[start, end)` range (equal bounds are an
/// empty window); `start > end` wraps midnight.
pub(crate) fn windows_exclude(raw: &str, minute_of_day: u32) -> bool {
    if raw.is_empty() {
        return false;
    }
    let Ok(windows) = serde_json::from_str::<Vec<ExcludeWindow>>(raw) else {
        return false;
    };
    windows.iter().any(|w| {
        let (Some(start), Some(end)) = (parse_hm(&w.start), parse_hm(&w.end)) else {
            return false;
        };
        if start <= end {
            minute_of_day >= start && minute_of_day < end
        } else {
            minute_of_day >= start || minute_of_day < end
        }
    })
}

pub(crate) fn parse_hm(s: &str) -> Option<u32> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.trim().parse().ok()?;
    let m: u32 = m.trim().parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

pub(crate) fn annotation_value(alert: &AlertRow, key: &str) -> Option<String> {
    if alert.annotations.is_empty() {
        return None;
    }
    let ann: HashMap<String, String> = serde_json::from_str(&alert.annotations).ok()?;
    ann.get(key).cloned().filter(|v| !v.is_empty())
}

/// Remove the upstream system-alert prefix so notifications do not repeat it.
pub(crate) fn strip_system_alert_prefix(s: &str) -> &str {
    s.trim_start_matches(SYSTEM_ALERT_PREFIX).trim()
}

/// Jira summaries cap at 255 characters.
pub(crate) fn truncate_summary(s: &str) -> String {
    const MAX_CHARS: usize = 255;
    if s.chars().count() <= MAX_CHARS {
        return s.to_string();
    }
    let truncated: String = s.chars().take(MAX_CHARS - 3).collect();
    format!("{truncated}...")
}
