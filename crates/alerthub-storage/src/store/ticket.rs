use anyhow::Result;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

use crate::entities::jira_ticket::{self, Column, Entity};
use crate::store::AlertStore;

impl AlertStore {
    pub async fn jira_ticket_exists(
        &self,
        rule_id: i64,
        source_id: i64,
        external_id: &str,
    ) -> Result<bool> {
        let count = Entity::find()
            .filter(Column::RuleId.eq(rule_id))
            .filter(Column::SourceId.eq(source_id))
            .filter(Column::ExternalId.eq(external_id))
            .count(self.db())
            .await?;
        Ok(count > 0)
    }

    /// Record a created ticket. The unique index makes a concurrent
    /// duplicate a no-op rather than an error.
    pub async fn record_jira_ticket(
        &self,
        rule_id: i64,
        source_id: i64,
        external_id: &str,
        issue_key: &str,
    ) -> Result<()> {
        let am = jira_ticket::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            rule_id: Set(rule_id),
            source_id: Set(source_id),
            external_id: Set(external_id.to_string()),
            issue_key: Set(issue_key.to_string()),
            created_at: Set(Utc::now().fixed_offset()),
        };
        let res = Entity::insert(am)
            .on_conflict(
                OnConflict::columns([Column::RuleId, Column::SourceId, Column::ExternalId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec(self.db())
            .await;
        match res {
            Ok(_) => Ok(()),
            // DO NOTHING on a conflicting insert reports nothing inserted.
            Err(sea_orm::DbErr::RecordNotInserted) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
