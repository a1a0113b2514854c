use sea_orm_migration::prelude::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m001_initial_schema"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(UP_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(DOWN_SQL).await?;
        Ok(())
    }
}

const UP_SQL: &str = "
CREATE TABLE IF NOT EXISTS datasources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    source_type TEXT NOT NULL,
    endpoint TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS channels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    channel_type TEXT NOT NULL,
    config TEXT NOT NULL DEFAULT '',
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS templates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    channel_type TEXT NOT NULL DEFAULT 'generic',
    body TEXT NOT NULL DEFAULT '',
    is_default INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    enabled INTEGER NOT NULL DEFAULT 1,
    priority INTEGER NOT NULL DEFAULT 0,
    datasource_ids TEXT NOT NULL DEFAULT '',
    query_language TEXT NOT NULL DEFAULT '',
    query_expression TEXT NOT NULL DEFAULT '',
    match_labels TEXT NOT NULL DEFAULT '',
    match_severity TEXT NOT NULL DEFAULT '',
    channel_ids TEXT NOT NULL DEFAULT '',
    template_id INTEGER,
    check_interval TEXT NOT NULL DEFAULT '1m',
    duration TEXT NOT NULL DEFAULT '',
    exclude_windows TEXT NOT NULL DEFAULT '',
    recovery_notify INTEGER NOT NULL DEFAULT 0,
    send_interval TEXT NOT NULL DEFAULT '',
    aggregation_enabled INTEGER NOT NULL DEFAULT 0,
    aggregate_by TEXT NOT NULL DEFAULT '',
    aggregate_window TEXT NOT NULL DEFAULT '',
    suppression TEXT NOT NULL DEFAULT '',
    thresholds TEXT NOT NULL DEFAULT '',
    jira_enabled INTEGER NOT NULL DEFAULT 0,
    jira_after_n INTEGER NOT NULL DEFAULT 3,
    jira_config TEXT NOT NULL DEFAULT '',
    last_run_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_rules_enabled ON rules(enabled);

CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY NOT NULL,
    source_id INTEGER NOT NULL,
    source_type TEXT NOT NULL,
    external_id TEXT NOT NULL,
    title TEXT NOT NULL,
    severity TEXT NOT NULL,
    status TEXT NOT NULL,
    firing_at TEXT NOT NULL,
    resolved_at TEXT,
    labels TEXT NOT NULL DEFAULT '{}',
    annotations TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alerts_source_external_status ON alerts(source_id, external_id, status);
CREATE INDEX IF NOT EXISTS idx_alerts_firing_at ON alerts(firing_at);
CREATE INDEX IF NOT EXISTS idx_alerts_created_at ON alerts(created_at);

CREATE TABLE IF NOT EXISTS alert_send_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    alert_id TEXT NOT NULL,
    channel_id INTEGER NOT NULL,
    success INTEGER NOT NULL DEFAULT 0,
    error TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_send_records_alert_id ON alert_send_records(alert_id);
CREATE INDEX IF NOT EXISTS idx_send_records_rate ON alert_send_records(alert_id, channel_id, success, created_at);

CREATE TABLE IF NOT EXISTS alert_silences (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    alert_id TEXT NOT NULL UNIQUE,
    silence_until TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_silences_alert_id ON alert_silences(alert_id);

CREATE TABLE IF NOT EXISTS jira_tickets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    rule_id INTEGER NOT NULL,
    source_id INTEGER NOT NULL,
    external_id TEXT NOT NULL,
    issue_key TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_jira_rule_source_ext ON jira_tickets(rule_id, source_id, external_id);

CREATE TABLE IF NOT EXISTS system_configs (
    config_key TEXT PRIMARY KEY NOT NULL,
    config_value TEXT NOT NULL DEFAULT ''
);
";

const DOWN_SQL: &str = "
DROP TABLE IF EXISTS system_configs;
DROP TABLE IF EXISTS jira_tickets;
DROP TABLE IF EXISTS alert_silences;
DROP TABLE IF EXISTS alert_send_records;
DROP TABLE IF EXISTS alerts;
DROP TABLE IF EXISTS rules;
DROP TABLE IF EXISTS templates;
DROP TABLE IF EXISTS channels;
DROP TABLE IF EXISTS datasources;
";
