use anyhow::Result;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, EntityTrait};

use crate::entities::system_config::{self, Column, Entity};
use crate::store::AlertStore;

pub const CONFIG_KEY_RETENTION_DAYS: &str = "retention_days";
pub const DEFAULT_RETENTION_DAYS: u32 = 90;

impl AlertStore {
    pub async fn get_system_config(&self, key: &str) -> Result<Option<String>> {
        let model = Entity::find_by_id(key).one(self.db()).await?;
        Ok(model.map(|m| m.config_value))
    }

    pub async fn set_system_config(&self, key: &str, value: &str) -> Result<()> {
        let am = system_config::ActiveModel {
            config_key: Set(key.to_string()),
            config_value: Set(value.to_string()),
        };
        Entity::insert(am)
            .on_conflict(
                OnConflict::column(Column::ConfigKey)
                    .update_column(Column::ConfigValue)
                    .to_owned(),
            )
            .exec(self.db())
            .await?;
        Ok(())
    }

    /// Alert retention in days: defaults to 90, valid range 1..=3650.
    /// Out-of-range or unparseable values fall back to the default.
    pub async fn retention_days(&self) -> u32 {
        match self.get_system_config(CONFIG_KEY_RETENTION_DAYS).await {
            Ok(Some(value)) => match value.parse::<u32>() {
                Ok(v) if (1..=3650).contains(&v) => v,
                _ => DEFAULT_RETENTION_DAYS,
            },
            _ => DEFAULT_RETENTION_DAYS,
        }
    }
}
