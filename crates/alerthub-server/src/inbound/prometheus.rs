//! Alertmanager-format webhook ingress, shared by the prometheus and
//! victoriametrics routes.

use super::{ingest, parse_rfc3339, IncomingAlert, SourceQuery};
use crate::state::AppState;
use alerthub_common::types::{AlertStatus, Severity};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub struct AlertmanagerWebhook {
    #[serde(default)]
    pub alerts: Vec<AlertmanagerAlert>,
}

#[derive(Debug, Deserialize)]
pub struct AlertmanagerAlert {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default, rename = "startsAt")]
    pub starts_at: String,
    #[serde(default, rename = "endsAt")]
    pub ends_at: String,
    /// Alertmanager's own fingerprint; we derive our own from
    /// `(source_id, title, labels)` instead.
    #[serde(default)]
    pub fingerprint: String,
}

/// Title falls back summary → alertname → "Alert"; severity comes from the
/// `severity` label, default "warning"; any status except "resolved"
/// counts as firing.
pub fn normalize(alert: AlertmanagerAlert) -> IncomingAlert {
    let status = if alert.status == AlertStatus::Resolved.as_str() {
        AlertStatus::Resolved
    } else {
        AlertStatus::Firing
    };
    let title = alert
        .annotations
        .get("summary")
        .filter(|s| !s.is_empty())
        .or_else(|| alert.annotations.get("alertname").filter(|s| !s.is_empty()))
        .cloned()
        .unwrap_or_else(|| "Alert".to_string());
    let severity = alert
        .labels
        .get("severity")
        .filter(|s| !s.is_empty())
        .cloned()
        .unwrap_or_else(|| Severity::Warning.to_string());

    IncomingAlert {
        title,
        severity,
        status: status.to_string(),
        starts_at: parse_rfc3339(&alert.starts_at),
        ends_at: parse_rfc3339(&alert.ends_at),
        labels: alert.labels,
        annotations: alert.annotations,
    }
}

pub async fn inbound_prometheus(
    State(state): State<AppState>,
    Query(query): Query<SourceQuery>,
    payload: Result<Json<AlertmanagerWebhook>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    serve(state, "prometheus", query, payload).await
}

pub async fn inbound_victoriametrics(
    State(state): State<AppState>,
    Query(query): Query<SourceQuery>,
    payload: Result<Json<AlertmanagerWebhook>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    serve(state, "victoriametrics", query, payload).await
}

async fn serve(
    state: AppState,
    source_type: &str,
    query: SourceQuery,
    payload: Result<Json<AlertmanagerWebhook>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let Ok(Json(payload)) = payload else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid json"})));
    };
    let source_id = query.resolve();
    let received = payload.alerts.len();
    let mut created = 0;
    for alert in payload.alerts {
        match ingest(&state, source_type, source_id, normalize(alert)).await {
            Ok(true) => created += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::error!(source_type, error = %e, "failed to ingest alert");
            }
        }
    }
    (
        StatusCode::OK,
        Json(json!({"received": received, "created": created})),
    )
}
