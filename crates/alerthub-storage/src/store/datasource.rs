use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait};
use serde::{Deserialize, Serialize};

use crate::entities::datasource::{self, Entity};
use crate::store::AlertStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasourceRow {
    pub id: i64,
    pub name: String,
    pub source_type: String,
    pub endpoint: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn to_row(m: datasource::Model) -> DatasourceRow {
    DatasourceRow {
        id: m.id,
        name: m.name,
        source_type: m.source_type,
        endpoint: m.endpoint,
        enabled: m.enabled,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

impl AlertStore {
    pub async fn get_datasource(&self, id: i64) -> Result<Option<DatasourceRow>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        Ok(model.map(to_row))
    }

    /// Test/seed helper: insert a datasource and return it with its ID.
    pub async fn insert_datasource(&self, row: &DatasourceRow) -> Result<DatasourceRow> {
        let now = Utc::now().fixed_offset();
        let am = datasource::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            name: Set(row.name.clone()),
            source_type: Set(row.source_type.clone()),
            endpoint: Set(row.endpoint.clone()),
            enabled: Set(row.enabled),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(to_row(model))
    }
}
