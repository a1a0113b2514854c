use alerthub_common::fingerprint;
use alerthub_engine::NotificationEngine;
use alerthub_notify::SenderRegistry;
use alerthub_server::inbound::{self, generic, prometheus, IncomingAlert};
use alerthub_server::state::AppState;
use alerthub_storage::AlertStore;
use chrono::{Duration, FixedOffset, Utc};
use std::collections::HashMap;
use std::sync::Arc;

async fn setup() -> AppState {
    let store = Arc::new(AlertStore::new("sqlite::memory:").await.unwrap());
    let engine = NotificationEngine::new(
        store.clone(),
        Arc::new(SenderRegistry::new()),
        FixedOffset::east_opt(8 * 3600).unwrap(),
    );
    AppState { store, engine }
}

fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn incoming(status: &str) -> IncomingAlert {
    IncomingAlert {
        title: "disk almost full".to_string(),
        severity: "warning".to_string(),
        status: status.to_string(),
        labels: labels(&[("job", "node"), ("mount", "/data")]),
        annotations: HashMap::new(),
        starts_at: Some(Utc::now() - Duration::minutes(10)),
        ends_at: None,
    }
}

#[tokio::test]
async fn ingest_then_resolve_round_trip() {
    let state = setup().await;
    let external_id = fingerprint::key(
        1,
        "disk almost full",
        &labels(&[("job", "node"), ("mount", "/data")]),
    );

    // First firing push creates a row.
    let created = inbound::ingest(&state, "prometheus", 1, incoming("firing"))
        .await
        .unwrap();
    assert!(created);
    let first = state
        .store
        .find_firing_alert(1, &external_id)
        .await
        .unwrap()
        .unwrap();

    // Second firing push updates in place: same ID, same firing_at.
    let mut repeat = incoming("firing");
    repeat.severity = "critical".to_string();
    let created = inbound::ingest(&state, "prometheus", 1, repeat).await.unwrap();
    assert!(!created);
    let updated = state
        .store
        .find_firing_alert(1, &external_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.id, first.id);
    assert_eq!(updated.firing_at, first.firing_at);
    assert_eq!(updated.severity, "critical");

    // Resolution transitions the row and stamps resolved_at from ends_at.
    let ends_at = Utc::now();
    let mut resolve = incoming("resolved");
    resolve.ends_at = Some(ends_at);
    inbound::ingest(&state, "prometheus", 1, resolve).await.unwrap();
    assert!(state
        .store
        .find_firing_alert(1, &external_id)
        .await
        .unwrap()
        .is_none());
    let resolved = state.store.get_alert(&first.id).await.unwrap().unwrap();
    assert_eq!(resolved.status, "resolved");
    let resolved_at = resolved.resolved_at.unwrap();
    assert!((resolved_at - ends_at).num_seconds().abs() < 1);

    // A further resolved push creates a resolved-only history row without
    // touching the prior row's ID.
    inbound::ingest(&state, "prometheus", 1, incoming("resolved"))
        .await
        .unwrap();
    assert_eq!(
        state
            .store
            .count_alerts_by_external(1, &external_id)
            .await
            .unwrap(),
        2
    );
    let prior = state.store.get_alert(&first.id).await.unwrap().unwrap();
    assert_eq!(prior.status, "resolved");
}

#[tokio::test]
async fn new_episode_after_resolution_gets_new_id() {
    let state = setup().await;
    let external_id = fingerprint::key(
        1,
        "disk almost full",
        &labels(&[("job", "node"), ("mount", "/data")]),
    );

    inbound::ingest(&state, "prometheus", 1, incoming("firing"))
        .await
        .unwrap();
    let first = state
        .store
        .find_firing_alert(1, &external_id)
        .await
        .unwrap()
        .unwrap();
    inbound::ingest(&state, "prometheus", 1, incoming("resolved"))
        .await
        .unwrap();

    let created = inbound::ingest(&state, "prometheus", 1, incoming("firing"))
        .await
        .unwrap();
    assert!(created);
    let second = state
        .store
        .find_firing_alert(1, &external_id)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(second.id, first.id);
}

#[tokio::test]
async fn different_sources_are_independent() {
    let state = setup().await;
    inbound::ingest(&state, "prometheus", 1, incoming("firing"))
        .await
        .unwrap();
    let created = inbound::ingest(&state, "elasticsearch", 2, incoming("firing"))
        .await
        .unwrap();
    assert!(created, "same payload under another source is a new alert");
}

#[test]
fn alertmanager_normalization_defaults() {
    let payload: prometheus::AlertmanagerWebhook = serde_json::from_str(
        r#"{
            "alerts": [{
                "status": "firing",
                "labels": {"severity": "critical", "job": "api"},
                "annotations": {"summary": "api down"},
                "startsAt": "2024-05-01T10:00:00Z",
                "endsAt": "",
                "fingerprint": "abcd"
            }]
        }"#,
    )
    .unwrap();
    let alert = payload.alerts.into_iter().next().unwrap();
    let normalized = prometheus::normalize(alert);
    assert_eq!(normalized.title, "api down");
    assert_eq!(normalized.severity, "critical");
    assert_eq!(normalized.status, "firing");
    assert!(normalized.starts_at.is_some());
    assert!(normalized.ends_at.is_none());

    // Missing summary falls back to alertname, then to "Alert"; missing
    // severity label defaults to warning; unknown status counts as firing.
    let bare: prometheus::AlertmanagerWebhook =
        serde_json::from_str(r#"{"alerts": [{"annotations": {"alertname": "up"}}]}"#).unwrap();
    let normalized = prometheus::normalize(bare.alerts.into_iter().next().unwrap());
    assert_eq!(normalized.title, "up");
    assert_eq!(normalized.severity, "warning");
    assert_eq!(normalized.status, "firing");

    let empty: prometheus::AlertmanagerWebhook =
        serde_json::from_str(r#"{"alerts": [{}]}"#).unwrap();
    let normalized = prometheus::normalize(empty.alerts.into_iter().next().unwrap());
    assert_eq!(normalized.title, "Alert");
}

#[test]
fn generic_normalization_defaults() {
    let payload: generic::GenericWebhook = serde_json::from_str(
        r#"{
            "alerts": [{
                "title": "slow query",
                "severity": "info",
                "status": "resolved",
                "labels": {"db": "orders"},
                "starts_at": "2024-05-01T10:00:00Z",
                "ends_at": "2024-05-01T11:00:00Z"
            }]
        }"#,
    )
    .unwrap();
    let normalized = generic::normalize(payload.alerts.into_iter().next().unwrap());
    assert_eq!(normalized.title, "slow query");
    assert_eq!(normalized.severity, "info");
    assert_eq!(normalized.status, "resolved");
    assert!(normalized.ends_at.is_some());

    let empty: generic::GenericWebhook = serde_json::from_str(r#"{"alerts": [{}]}"#).unwrap();
    let normalized = generic::normalize(empty.alerts.into_iter().next().unwrap());
    assert_eq!(normalized.title, "Alert");
    assert_eq!(normalized.severity, "warning");
    assert_eq!(normalized.status, "firing");
    assert!(normalized.starts_at.is_none());
}

#[test]
fn timestamps_parse_leniently() {
    assert!(inbound::parse_rfc3339("2024-05-01T10:00:00Z").is_some());
    assert!(inbound::parse_rfc3339("2024-05-01T10:00:00+08:00").is_some());
    assert!(inbound::parse_rfc3339("").is_none());
    assert!(inbound::parse_rfc3339("yesterday").is_none());
}

#[test]
fn source_query_resolution() {
    let q = inbound::SourceQuery { source_id: None };
    assert_eq!(q.resolve(), 1);
    let q = inbound::SourceQuery { source_id: Some(0) };
    assert_eq!(q.resolve(), 1);
    let q = inbound::SourceQuery { source_id: Some(7) };
    assert_eq!(q.resolve(), 7);
}
