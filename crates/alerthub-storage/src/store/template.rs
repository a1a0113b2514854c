use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};

use crate::entities::template::{self, Column, Entity};
use crate::store::AlertStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRow {
    pub id: i64,
    pub name: String,
    pub channel_type: String,
    pub body: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn to_row(m: template::Model) -> TemplateRow {
    TemplateRow {
        id: m.id,
        name: m.name,
        channel_type: m.channel_type,
        body: m.body,
        is_default: m.is_default,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

impl AlertStore {
    pub async fn get_template(&self, id: i64) -> Result<Option<TemplateRow>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        Ok(model.map(to_row))
    }

    /// The template flagged `is_default`, used when a rule has no template
    /// binding or its binding points at a deleted row.
    pub async fn default_template(&self) -> Result<Option<TemplateRow>> {
        let model = Entity::find()
            .filter(Column::IsDefault.eq(true))
            .one(self.db())
            .await?;
        Ok(model.map(to_row))
    }

    pub async fn insert_template(&self, row: &TemplateRow) -> Result<TemplateRow> {
        let now = Utc::now().fixed_offset();
        let am = template::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            name: Set(row.name.clone()),
            channel_type: Set(row.channel_type.clone()),
            body: Set(row.body.clone()),
            is_default: Set(row.is_default),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(to_row(model))
    }
}
