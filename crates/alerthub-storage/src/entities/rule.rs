use sea_orm::entity::prelude::*;

/// JSON-bearing columns (`datasource_ids`, `match_labels`, `channel_ids`,
/// `exclude_windows`, `suppression`, `thresholds`) hold serialized values;
/// parsing lives on the row type in `store::rule`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "rules")]
pub struct Model {
    #[sea_orm(primary_key)]
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
    pub last_run_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
