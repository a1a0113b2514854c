use crate::store::{AlertRow, AlertStore, ChannelRow, RuleRow};
use chrono::{Duration, Utc};

async fn setup() -> AlertStore {
    AlertStore::new("sqlite::memory:").await.unwrap()
}

fn make_alert(id: &str, source_id: i64, external_id: &str, status: &str) -> AlertRow {
    let now = Utc::now();
    AlertRow {
        id: id.to_string(),
        source_id,
        source_type: "prometheus".to_string(),
        external_id: external_id.to_string(),
        title: "disk usage: host-1".to_string(),
        severity: "warning".to_string(),
        status: status.to_string(),
        firing_at: now,
        resolved_at: None,
        labels: r#"{"job":"node"}"#.to_string(),
        annotations: "{}".to_string(),
        created_at: now,
        updated_at: now,
    }
}

fn make_rule(name: &str) -> RuleRow {
    let now = Utc::now();
    RuleRow {
        id: 0,
        name: name.to_string(),
        description: String::new(),
        enabled: true,
        priority: 0,
        datasource_ids: "[1]".to_string(),
        query_language: "promql".to_string(),
        query_expression: "up == 0".to_string(),
        match_labels: String::new(),
        match_severity: String::new(),
        channel_ids: "[1]".to_string(),
        template_id: None,
        check_interval: "1m".to_string(),
        duration: String::new(),
        exclude_windows: String::new(),
        recovery_notify: false,
        send_interval: String::new(),
        aggregation_enabled: false,
        aggregate_by: String::new(),
        aggregate_window: String::new(),
        suppression: String::new(),
        thresholds: String::new(),
        jira_enabled: false,
        jira_after_n: 3,
        jira_config: String::new(),
        last_run_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn upsert_alert_inserts_then_updates() {
    let store = setup().await;
    let mut alert = make_alert("a-1", 1, "ext-1", "firing");
    store.upsert_alert(&alert).await.unwrap();

    let stored = store.get_alert("a-1").await.unwrap().unwrap();
    assert_eq!(stored.status, "firing");

    alert.severity = "critical".to_string();
    store.upsert_alert(&alert).await.unwrap();

    let stored = store.get_alert("a-1").await.unwrap().unwrap();
    assert_eq!(stored.severity, "critical");
    assert_eq!(stored.id, "a-1");
}

#[tokio::test]
async fn find_firing_alert_ignores_resolved_rows() {
    let store = setup().await;
    let mut resolved = make_alert("a-old", 1, "ext-1", "resolved");
    resolved.resolved_at = Some(Utc::now());
    store.upsert_alert(&resolved).await.unwrap();

    assert!(store.find_firing_alert(1, "ext-1").await.unwrap().is_none());

    store
        .upsert_alert(&make_alert("a-new", 1, "ext-1", "firing"))
        .await
        .unwrap();
    let found = store.find_firing_alert(1, "ext-1").await.unwrap().unwrap();
    assert_eq!(found.id, "a-new");

    // Different source does not match.
    assert!(store.find_firing_alert(2, "ext-1").await.unwrap().is_none());
}

#[tokio::test]
async fn count_alerts_by_external_counts_all_statuses() {
    let store = setup().await;
    let mut resolved = make_alert("a-1", 1, "ext-1", "resolved");
    resolved.resolved_at = Some(Utc::now());
    store.upsert_alert(&resolved).await.unwrap();
    store
        .upsert_alert(&make_alert("a-2", 1, "ext-1", "firing"))
        .await
        .unwrap();
    store
        .upsert_alert(&make_alert("a-3", 1, "ext-other", "firing"))
        .await
        .unwrap();

    assert_eq!(store.count_alerts_by_external(1, "ext-1").await.unwrap(), 2);
}

#[tokio::test]
async fn send_record_window_counting() {
    let store = setup().await;
    store
        .append_send_record("a-1", 7, true, None)
        .await
        .unwrap();
    store
        .append_send_record("a-1", 7, false, Some("timeout"))
        .await
        .unwrap();
    store
        .append_send_record("a-1", 8, true, None)
        .await
        .unwrap();

    let since = Utc::now() - Duration::minutes(5);
    // Failures and other channels are not counted.
    assert_eq!(
        store
            .count_recent_successful_sends("a-1", 7, since)
            .await
            .unwrap(),
        1
    );
    // Window entirely in the future sees nothing.
    assert_eq!(
        store
            .count_recent_successful_sends("a-1", 7, Utc::now() + Duration::minutes(1))
            .await
            .unwrap(),
        0
    );

    let records = store.list_send_records("a-1").await.unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(
        records.iter().filter(|r| r.error.is_some()).count(),
        1
    );
}

#[tokio::test]
async fn silence_gates_until_expiry() {
    let store = setup().await;
    let now = Utc::now();
    store
        .silence_alert("a-1", now + Duration::minutes(30))
        .await
        .unwrap();

    assert!(store.has_active_silence("a-1", now).await.unwrap());
    assert!(!store
        .has_active_silence("a-1", now + Duration::hours(1))
        .await
        .unwrap());
    assert!(!store.has_active_silence("a-2", now).await.unwrap());

    // Re-silencing the same alert extends rather than erroring.
    store
        .silence_alert("a-1", now + Duration::hours(2))
        .await
        .unwrap();
    assert!(store
        .has_active_silence("a-1", now + Duration::hours(1))
        .await
        .unwrap());
}

#[tokio::test]
async fn jira_ticket_is_unique_per_rule_source_external() {
    let store = setup().await;
    store
        .record_jira_ticket(1, 1, "ext-1", "OPS-1")
        .await
        .unwrap();
    assert!(store.jira_ticket_exists(1, 1, "ext-1").await.unwrap());
    assert!(!store.jira_ticket_exists(2, 1, "ext-1").await.unwrap());

    // Duplicate record is swallowed by the unique index.
    store
        .record_jira_ticket(1, 1, "ext-1", "OPS-2")
        .await
        .unwrap();
}

#[tokio::test]
async fn retention_queries_select_and_delete_old_alerts() {
    let store = setup().await;
    store
        .upsert_alert(&make_alert("a-1", 1, "ext-1", "firing"))
        .await
        .unwrap();
    store
        .append_send_record("a-1", 7, true, None)
        .await
        .unwrap();

    // Everything was created just now, so a past cutoff selects nothing.
    let past = Utc::now() - Duration::days(1);
    assert!(store
        .list_alert_ids_created_before(past)
        .await
        .unwrap()
        .is_empty());

    // A future cutoff selects and deletes the row and its send records.
    let future = Utc::now() + Duration::seconds(5);
    let ids = store.list_alert_ids_created_before(future).await.unwrap();
    assert_eq!(ids, vec!["a-1".to_string()]);

    assert_eq!(store.delete_send_records_for(&ids).await.unwrap(), 1);
    assert_eq!(store.delete_alerts_created_before(future).await.unwrap(), 1);
    assert!(store.get_alert("a-1").await.unwrap().is_none());
}

#[tokio::test]
async fn retention_days_defaults_and_clamps() {
    let store = setup().await;
    assert_eq!(store.retention_days().await, 90);

    store
        .set_system_config("retention_days", "30")
        .await
        .unwrap();
    assert_eq!(store.retention_days().await, 30);

    store
        .set_system_config("retention_days", "0")
        .await
        .unwrap();
    assert_eq!(store.retention_days().await, 90);

    store
        .set_system_config("retention_days", "9999")
        .await
        .unwrap();
    assert_eq!(store.retention_days().await, 90);

    store
        .set_system_config("retention_days", "not-a-number")
        .await
        .unwrap();
    assert_eq!(store.retention_days().await, 90);
}

#[tokio::test]
async fn rule_listing_and_json_accessors() {
    let store = setup().await;

    let mut high = make_rule("high-priority");
    high.priority = 1;
    high.match_labels = r#"{"job":"api"}"#.to_string();
    let mut low = make_rule("low-priority");
    low.priority = 10;
    let mut disabled = make_rule("disabled");
    disabled.enabled = false;
    let mut queryless = make_rule("webhook-only");
    queryless.query_expression = String::new();

    let high = store.insert_rule(&high).await.unwrap();
    store.insert_rule(&low).await.unwrap();
    store.insert_rule(&disabled).await.unwrap();
    store.insert_rule(&queryless).await.unwrap();

    let enabled = store.list_enabled_rules().await.unwrap();
    assert_eq!(enabled.len(), 3);
    assert_eq!(enabled[0].name, "high-priority");

    let schedulable = store.list_schedulable_rules().await.unwrap();
    assert_eq!(schedulable.len(), 2);
    assert!(schedulable.iter().all(|r| r.name != "webhook-only"));

    assert_eq!(high.first_datasource_id(), Some(1));
    assert_eq!(high.channel_id_list(), vec![1]);
    assert_eq!(high.match_label_map().get("job").unwrap(), "api");

    // Malformed JSON reads as empty rather than failing.
    let mut broken = make_rule("broken");
    broken.datasource_ids = "not-json".to_string();
    broken.match_labels = "{broken".to_string();
    let broken = store.insert_rule(&broken).await.unwrap();
    assert!(broken.first_datasource_id().is_none());
    assert!(broken.match_label_map().is_empty());

    store.touch_rule_last_run(high.id, Utc::now()).await.unwrap();
    let touched = store.get_rule(high.id).await.unwrap().unwrap();
    assert!(touched.last_run_at.is_some());
}

#[tokio::test]
async fn template_default_lookup_and_rebind() {
    let store = setup().await;
    assert!(store.default_template().await.unwrap().is_none());

    let tpl = store
        .insert_template(&crate::store::TemplateRow {
            id: 0,
            name: "default".to_string(),
            channel_type: "generic".to_string(),
            body: "AlertID: {{AlertID}}".to_string(),
            is_default: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

    let found = store.default_template().await.unwrap().unwrap();
    assert_eq!(found.id, tpl.id);

    let rule = store.insert_rule(&make_rule("r")).await.unwrap();
    store.rebind_rule_template(rule.id, tpl.id).await.unwrap();
    let rebound = store.get_rule(rule.id).await.unwrap().unwrap();
    assert_eq!(rebound.template_id, Some(tpl.id));
}

#[tokio::test]
async fn channel_and_datasource_round_trip() {
    let store = setup().await;
    let ch = store
        .insert_channel(&ChannelRow {
            id: 0,
            name: "ops".to_string(),
            channel_type: "lark".to_string(),
            config: r#"{"webhook_url":"https://example.com/hook"}"#.to_string(),
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await
        .unwrap();
    let found = store.get_channel(ch.id).await.unwrap().unwrap();
    assert_eq!(found.channel_type, "lark");

    let ds = store
        .insert_datasource(&crate::store::DatasourceRow {
            id: 0,
            name: "prom".to_string(),
            source_type: "prometheus".to_string(),
            endpoint: "http://localhost:9090".to_string(),
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await
        .unwrap();
    let found = store.get_datasource(ds.id).await.unwrap().unwrap();
    assert_eq!(found.endpoint, "http://localhost:9090");
}
