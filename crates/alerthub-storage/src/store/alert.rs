use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::{Deserialize, Serialize};

use crate::entities::alert::{self, Column, Entity};
use crate::store::AlertStore;

/// Unified alert record. `labels` and `annotations` hold serialized JSON
/// objects; `external_id` is the dedup fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRow {
    pub id: String,
    pub source_id: i64,
    pub source_type: String,
    pub external_id: String,
    pub title: String,
    pub severity: String,
    pub status: String,
    pub firing_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub labels: String,
    pub annotations: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn to_row(m: alert::Model) -> AlertRow {
    AlertRow {
        id: m.id,
        source_id: m.source_id,
        source_type: m.source_type,
        external_id: m.external_id,
        title: m.title,
        severity: m.severity,
        status: m.status,
        firing_at: m.firing_at.with_timezone(&Utc),
        resolved_at: m.resolved_at.map(|t| t.with_timezone(&Utc)),
        labels: m.labels,
        annotations: m.annotations,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

fn to_active(row: &AlertRow, updated_at: DateTime<Utc>) -> alert::ActiveModel {
    alert::ActiveModel {
        id: Set(row.id.clone()),
        source_id: Set(row.source_id),
        source_type: Set(row.source_type.clone()),
        external_id: Set(row.external_id.clone()),
        title: Set(row.title.clone()),
        severity: Set(row.severity.clone()),
        status: Set(row.status.clone()),
        firing_at: Set(row.firing_at.fixed_offset()),
        resolved_at: Set(row.resolved_at.map(|t| t.fixed_offset())),
        labels: Set(row.labels.clone()),
        annotations: Set(row.annotations.clone()),
        created_at: Set(row.created_at.fixed_offset()),
        updated_at: Set(updated_at.fixed_offset()),
    }
}

impl AlertStore {
    pub async fn get_alert(&self, id: &str) -> Result<Option<AlertRow>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        Ok(model.map(to_row))
    }

    /// The currently firing row for `(source_id, external_id)`, if any.
    /// The firing-singleton invariant guarantees at most one.
    pub async fn find_firing_alert(
        &self,
        source_id: i64,
        external_id: &str,
    ) -> Result<Option<AlertRow>> {
        let model = Entity::find()
            .filter(Column::SourceId.eq(source_id))
            .filter(Column::ExternalId.eq(external_id))
            .filter(Column::Status.eq("firing"))
            .one(self.db())
            .await?;
        Ok(model.map(to_row))
    }

    /// Insert-or-update by alert ID in one statement. Callers preserve
    /// `firing_at` and `created_at` from the existing row before calling;
    /// this closes the lookup/insert race on restart.
    pub async fn upsert_alert(&self, row: &AlertRow) -> Result<()> {
        let am = to_active(row, Utc::now());
        Entity::insert(am)
            .on_conflict(
                OnConflict::column(Column::Id)
                    .update_columns([
                        Column::SourceId,
                        Column::SourceType,
                        Column::ExternalId,
                        Column::Title,
                        Column::Severity,
                        Column::Status,
                        Column::FiringAt,
                        Column::ResolvedAt,
                        Column::Labels,
                        Column::Annotations,
                        Column::CreatedAt,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(self.db())
            .await?;
        Ok(())
    }

    /// How many rows (any status) this logical alert has accumulated.
    /// Drives the ticket-gating occurrence threshold.
    pub async fn count_alerts_by_external(
        &self,
        source_id: i64,
        external_id: &str,
    ) -> Result<u64> {
        Ok(Entity::find()
            .filter(Column::SourceId.eq(source_id))
            .filter(Column::ExternalId.eq(external_id))
            .count(self.db())
            .await?)
    }

    /// Firing alerts whose episode started at or after `since`; aggregation
    /// candidates.
    pub async fn list_firing_alerts_since(&self, since: DateTime<Utc>) -> Result<Vec<AlertRow>> {
        let rows = Entity::find()
            .filter(Column::FiringAt.gte(since.fixed_offset()))
            .filter(Column::Status.eq("firing"))
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    pub async fn list_alert_ids_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let ids: Vec<String> = Entity::find()
            .select_only()
            .column(Column::Id)
            .filter(Column::CreatedAt.lt(cutoff.fixed_offset()))
            .order_by_asc(Column::CreatedAt)
            .into_tuple()
            .all(self.db())
            .await?;
        Ok(ids)
    }

    pub async fn delete_alerts_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let res = Entity::delete_many()
            .filter(Column::CreatedAt.lt(cutoff.fixed_offset()))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected)
    }
}
