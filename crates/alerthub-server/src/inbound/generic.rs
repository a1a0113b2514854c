//! Generic webhook ingress for push-only datasources (elasticsearch,
//! doris): a flat `alerts` array with top-level title/severity/status.

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
pub struct GenericWebhook {
    #[serde(default)]
    pub alerts: Vec<GenericAlert>,
}

#[derive(Debug, Deserialize)]
pub struct GenericAlert {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    #[serde(default)]
    pub starts_at: String,
    #[serde(default)]
    pub ends_at: String,
    #[serde(default)]
    pub fingerprint: String,
}

pub fn normalize(alert: GenericAlert) -> IncomingAlert {
    let status = if alert.status.is_empty() {
        AlertStatus::Firing.as_str().to_string()
    } else {
        alert.status
    };
    let title = if alert.title.is_empty() {
        "Alert".to_string()
    } else {
        alert.title
    };
    let severity = if alert.severity.is_empty() {
        Severity::Warning.to_string()
    } else {
        alert.severity
    };

    IncomingAlert {
        title,
        severity,
        status,
        starts_at: parse_rfc3339(&alert.starts_at),
        ends_at: parse_rfc3339(&alert.ends_at),
        labels: alert.labels,
        annotations: alert.annotations,
    }
}

pub async fn inbound_elasticsearch(
    State(state): State<AppState>,
    Query(query): Query<SourceQuery>,
    payload: Result<Json<GenericWebhook>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    serve(state, "elasticsearch", query, payload).await
}

pub async fn inbound_doris(
    State(state): State<AppState>,
    Query(query): Query<SourceQuery>,
    payload: Result<Json<GenericWebhook>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    serve(state, "doris", query, payload).await
}

async fn serve(
    state: AppState,
    source_type: &str,
    query: SourceQuery,
    payload: Result<Json<GenericWebhook>, JsonRejection>,
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
