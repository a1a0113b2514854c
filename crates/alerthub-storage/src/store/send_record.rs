use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};

use crate::entities::alert_send_record::{self, Column, Entity};
use crate::store::AlertStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRecordRow {
    pub id: i64,
    pub alert_id: String,
    pub channel_id: i64,
    pub success: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn to_row(m: alert_send_record::Model) -> SendRecordRow {
    SendRecordRow {
        id: m.id,
        alert_id: m.alert_id,
        channel_id: m.channel_id,
        success: m.success,
        error: m.error,
        created_at: m.created_at.with_timezone(&Utc),
    }
}

impl AlertStore {
    /// Append one dispatch outcome to the send log.
    pub async fn append_send_record(
        &self,
        alert_id: &str,
        channel_id: i64,
        success: bool,
        error: Option<&str>,
    ) -> Result<()> {
        let am = alert_send_record::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            alert_id: Set(alert_id.to_string()),
            channel_id: Set(channel_id),
            success: Set(success),
            error: Set(error.map(str::to_string)),
            created_at: Set(Utc::now().fixed_offset()),
        };
        am.insert(self.db()).await?;
        Ok(())
    }

    /// Successful sends for `(alert_id, channel_id)` newer than `since`.
    /// Basis for both the send-interval throttle and recovery dedup.
    pub async fn count_recent_successful_sends(
        &self,
        alert_id: &str,
        channel_id: i64,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        Ok(Entity::find()
            .filter(Column::AlertId.eq(alert_id))
            .filter(Column::ChannelId.eq(channel_id))
            .filter(Column::Success.eq(true))
            .filter(Column::CreatedAt.gt(since.fixed_offset()))
            .count(self.db())
            .await?)
    }

    pub async fn list_send_records(&self, alert_id: &str) -> Result<Vec<SendRecordRow>> {
        let rows = Entity::find()
            .filter(Column::AlertId.eq(alert_id))
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    /// Bulk-delete send records for the given alerts (retention sweep).
    pub async fn delete_send_records_for(&self, alert_ids: &[String]) -> Result<u64> {
        if alert_ids.is_empty() {
            return Ok(0);
        }
        let res = Entity::delete_many()
            .filter(Column::AlertId.is_in(alert_ids.iter().map(String::as_str)))
            .exec(self.db())
            .await?;
        Ok(res.rows_affected)
    }
}
