use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, Order, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::entities::rule::{self, Column, Entity};
use crate::store::AlertStore;

/// Alert rule as read by the scheduler and the notification engine.
///
/// List-valued columns are stored as JSON text; the accessors below parse
/// them leniently (malformed JSON reads as empty).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub priority: i32,
    pub datasource_ids: String,
    pub query_language: String,
    pub query_expression: String,
    pub match_labels: String,
    pub match_severity: String,
    pub channel_ids: String,
    pub template_id: Option<i64>,
    pub check_interval: String,
    pub duration: String,
    pub exclude_windows: String,
    pub recovery_notify: bool,
    pub send_interval: String,
    pub aggregation_enabled: bool,
    pub aggregate_by: String,
    pub aggregate_window: String,
    pub suppression: String,
    pub thresholds: String,
    pub jira_enabled: bool,
    pub jira_after_n: i32,
    pub jira_config: String,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RuleRow {
    pub fn datasource_id_list(&self) -> Vec<i64> {
        parse_id_list(&self.datasource_ids)
    }

    /// The datasource the scheduler queries. Only the first entry is
    /// evaluated; the full list still participates in engine matching.
    pub fn first_datasource_id(&self) -> Option<i64> {
        self.datasource_id_list().into_iter().find(|id| *id != 0)
    }

    pub fn channel_id_list(&self) -> Vec<i64> {
        parse_id_list(&self.channel_ids)
    }

    pub fn match_label_map(&self) -> HashMap<String, String> {
        if self.match_labels.is_empty() {
            return HashMap::new();
        }
        serde_json::from_str(&self.match_labels).unwrap_or_default()
    }
}

fn parse_id_list(raw: &str) -> Vec<i64> {
    if raw.is_empty() {
        return Vec::new();
    }
    serde_json::from_str(raw).unwrap_or_default()
}

fn to_row(m: rule::Model) -> RuleRow {
    RuleRow {
        id: m.id,
        name: m.name,
        description: m.description,
        enabled: m.enabled,
        priority: m.priority,
        datasource_ids: m.datasource_ids,
        query_language: m.query_language,
        query_expression: m.query_expression,
        match_labels: m.match_labels,
        match_severity: m.match_severity,
        channel_ids: m.channel_ids,
        template_id: m.template_id,
        check_interval: m.check_interval,
        duration: m.duration,
        exclude_windows: m.exclude_windows,
        recovery_notify: m.recovery_notify,
        send_interval: m.send_interval,
        aggregation_enabled: m.aggregation_enabled,
        aggregate_by: m.aggregate_by,
        aggregate_window: m.aggregate_window,
        suppression: m.suppression,
        thresholds: m.thresholds,
        jira_enabled: m.jira_enabled,
        jira_after_n: m.jira_after_n,
        jira_config: m.jira_config,
        last_run_at: m.last_run_at.map(|t| t.with_timezone(&Utc)),
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

impl AlertStore {
    pub async fn get_rule(&self, id: i64) -> Result<Option<RuleRow>> {
        let model = Entity::find_by_id(id).one(self.db()).await?;
        Ok(model.map(to_row))
    }

    /// Enabled rules in engine matching order (priority ascending).
    pub async fn list_enabled_rules(&self) -> Result<Vec<RuleRow>> {
        let rows = Entity::find()
            .filter(Column::Enabled.eq(true))
            .order_by(Column::Priority, Order::Asc)
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    /// Enabled rules with a non-empty query expression; the set the
    /// scheduler keeps evaluation tasks for.
    pub async fn list_schedulable_rules(&self) -> Result<Vec<RuleRow>> {
        let rows = Entity::find()
            .filter(Column::Enabled.eq(true))
            .filter(Column::QueryExpression.ne(""))
            .all(self.db())
            .await?;
        Ok(rows.into_iter().map(to_row).collect())
    }

    pub async fn touch_rule_last_run(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let Some(model) = Entity::find_by_id(id).one(self.db()).await? else {
            return Ok(());
        };
        let mut am: rule::ActiveModel = model.into();
        am.last_run_at = Set(Some(at.fixed_offset()));
        am.update(self.db()).await?;
        Ok(())
    }

    /// Point a rule at a new template. Used by the engine to self-heal
    /// rules whose template row was deleted.
    pub async fn rebind_rule_template(&self, rule_id: i64, template_id: i64) -> Result<()> {
        let Some(model) = Entity::find_by_id(rule_id).one(self.db()).await? else {
            return Ok(());
        };
        let mut am: rule::ActiveModel = model.into();
        am.template_id = Set(Some(template_id));
        am.updated_at = Set(Utc::now().fixed_offset());
        am.update(self.db()).await?;
        Ok(())
    }

    /// Test/seed helper: insert a rule and return it with its assigned ID.
    pub async fn insert_rule(&self, row: &RuleRow) -> Result<RuleRow> {
        let now = Utc::now().fixed_offset();
        let am = rule::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            name: Set(row.name.clone()),
            description: Set(row.description.clone()),
            enabled: Set(row.enabled),
            priority: Set(row.priority),
            datasource_ids: Set(row.datasource_ids.clone()),
            query_language: Set(row.query_language.clone()),
            query_expression: Set(row.query_expression.clone()),
            match_labels: Set(row.match_labels.clone()),
            match_severity: Set(row.match_severity.clone()),
            channel_ids: Set(row.channel_ids.clone()),
            template_id: Set(row.template_id),
            check_interval: Set(row.check_interval.clone()),
            duration: Set(row.duration.clone()),
            exclude_windows: Set(row.exclude_windows.clone()),
            recovery_notify: Set(row.recovery_notify),
            send_interval: Set(row.send_interval.clone()),
            aggregation_enabled: Set(row.aggregation_enabled),
            aggregate_by: Set(row.aggregate_by.clone()),
            aggregate_window: Set(row.aggregate_window.clone()),
            suppression: Set(row.suppression.clone()),
            thresholds: Set(row.thresholds.clone()),
            jira_enabled: Set(row.jira_enabled),
            jira_after_n: Set(row.jira_after_n),
            jira_config: Set(row.jira_config.clone()),
            last_run_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        Ok(to_row(model))
    }
}
