use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait};
use serde::{Deserialize, Serialize};

use crate::entities::channel::{self, Entity};
use crate::store::AlertStore;

/// Notification channel: type tag plus a per-channel JSON config string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRow {
    pub id: i64,
    pub name: String,
    pub channel_type: String,
    pub config: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn to_row(m: channel::Model) -> ChannelRow {
    ChannelRow {
        id: m.id,
        name: m.name,
        channel_type: m.channel_type,
        config: m.config,
        enabled: m.enabled,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

impl AlertStore {
    pub async fn get_channel(&self, id: i64) -> Result<Option<ChannelRow>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        Ok(model.map(to_row))
    }

    /// Test/seed helper: insert a channel and return it with its assigned ID.
    pub async fn insert_channel(&self, row: &ChannelRow) -> Result<ChannelRow> {
        let now = Utc::now().fixed_offset();
        let am = channel::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            name: Set(row.name.clone()),
            channel_type: Set(row.channel_type.clone()),
            config: Set(row.config.clone()),
            enabled: Set(row.enabled),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(to_row(model))
    }
}
