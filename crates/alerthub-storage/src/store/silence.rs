use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

use crate::entities::alert_silence::{self, Column, Entity};
use crate::store::AlertStore;

impl AlertStore {
    /// True when the alert has a manual silence that has not yet expired.
    pub async fn has_active_silence(&self, alert_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let count = Entity::find()
            .filter(Column::AlertId.eq(alert_id))
            .filter(Column::SilenceUntil.gt(now.fixed_offset()))
            .count(self.db())
            .await?;
        Ok(count > 0)
    }

    /// Create or extend the silence for an alert.
    pub async fn silence_alert(&self, alert_id: &str, until: DateTime<Utc>) -> Result<()> {
        let am = alert_silence::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            alert_id: Set(alert_id.to_string()),
            silence_until: Set(until.fixed_offset()),
            created_at: Set(Utc::now().fixed_offset()),
        };
        Entity::insert(am)
            .on_conflict(
                OnConflict::column(Column::AlertId)
                    .update_column(Column::SilenceUntil)
                    .to_owned(),
            )
            .exec(self.db())
            .await?;
        Ok(())
    }
}
