//! Webhook ingress: normalizes pushed payloads into the unified alert
//! model and feeds them to the notification engine synchronously.

pub mod generic;
pub mod prometheus;

use crate::state::AppState;
use alerthub_common::types::AlertStatus;
use alerthub_common::{fingerprint, id};
use alerthub_storage::AlertRow;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

/// Used when neither handler configuration nor query parameter supplies a
/// source.
const DEFAULT_SOURCE_ID: i64 = 1;

#[derive(Debug, Default, Deserialize)]
pub struct SourceQuery {
    pub source_id: Option<i64>,
}

impl SourceQuery {
    pub fn resolve(&self) -> i64 {
        match self.source_id {
            Some(source_id) if source_id > 0 => source_id,
            _ => DEFAULT_SOURCE_ID,
        }
    }
}

/// A pushed alert, normalized away from its wire format.
#[derive(Debug, Clone)]
pub struct IncomingAlert {
    pub title: String,
    pub severity: String,
    pub status: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

pub fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Persist one normalized alert under the one-firing-row-per
/// `(source_id, external_id)` contract, then hand it to the engine
/// synchronously. Returns true when a new firing row was created.
pub async fn ingest(
    state: &AppState,
    source_type: &str,
    source_id: i64,
    incoming: IncomingAlert,
) -> anyhow::Result<bool> {
    let labels_json =
        serde_json::to_string(&incoming.labels).unwrap_or_else(|_| "{}".to_string());
    let annotations_json =
        serde_json::to_string(&incoming.annotations).unwrap_or_else(|_| "{}".to_string());
    let external_id = fingerprint::key(source_id, &incoming.title, &incoming.labels);
    let now = Utc::now();
    let firing_at = incoming.starts_at.unwrap_or(now);

    let existing = state.store.find_firing_alert(source_id, &external_id).await?;
    let resolved = incoming.status == AlertStatus::Resolved.as_str();

    let (alert, created) = match (resolved, existing) {
        (true, Some(mut row)) => {
            row.status = AlertStatus::Resolved.as_str().to_string();
            row.resolved_at = Some(incoming.ends_at.unwrap_or(now));
            row.title = incoming.title;
            row.labels = labels_json;
            row.annotations = annotations_json;
            state.store.upsert_alert(&row).await?;
            (row, false)
        }
        (true, None) => {
            // Resolved with no prior firing row: keep a resolved-only row
            // for history.
            let row = AlertRow {
                id: id::next_id(),
                source_id,
                source_type: source_type.to_string(),
                external_id,
                title: incoming.title,
                severity: incoming.severity,
                status: AlertStatus::Resolved.as_str().to_string(),
                firing_at,
                resolved_at: Some(incoming.ends_at.unwrap_or(now)),
                labels: labels_json,
                annotations: annotations_json,
                created_at: now,
                updated_at: now,
            };
            state.store.upsert_alert(&row).await?;
            (row, false)
        }
        (false, Some(mut row)) => {
            // Repeat firing push: update in place; the ID and the episode
            // start stay put.
            row.title = incoming.title;
            row.severity = incoming.severity;
            row.labels = labels_json;
            row.annotations = annotations_json;
            state.store.upsert_alert(&row).await?;
            (row, false)
        }
        (false, None) => {
            let row = AlertRow {
                id: id::next_id(),
                source_id,
                source_type: source_type.to_string(),
                external_id,
                title: incoming.title,
                severity: incoming.severity,
                status: AlertStatus::Firing.as_str().to_string(),
                firing_at,
                resolved_at: None,
                labels: labels_json,
                annotations: annotations_json,
                created_at: now,
                updated_at: now,
            };
            state.store.upsert_alert(&row).await?;
            (row, true)
        }
    };

    state.engine.process(&alert).await;
    Ok(created)
}
