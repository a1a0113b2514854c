//! Startup seeding of defaults the engine depends on.

use alerthub_storage::store::config::{CONFIG_KEY_RETENTION_DAYS, DEFAULT_RETENTION_DAYS};
use alerthub_storage::{AlertStore, TemplateRow};
use anyhow::Result;
use chrono::Utc;

const DEFAULT_TEMPLATE_BODY: &str = "{{#if IsRecovery}}✅ 告警已恢复{{else}}🔥 告警触发{{/if}}

**标题**: {{Title}}
**级别**: {{Severity}}
{{#if Description}}**描述**: {{Description}}
{{/if}}{{#if Value}}**当前值**: {{Value}}
{{/if}}**开始时间**: {{StartAt}}
{{#if ResolvedAt}}**恢复时间**: {{ResolvedAt}}
{{/if}}{{#if RuleDescription}}**规则说明**: {{RuleDescription}}
{{/if}}";

/// Insert the default notification template when none is flagged default.
/// The template chain in the engine depends on this row existing.
pub async fn ensure_default_template(store: &AlertStore) -> Result<()> {
    if store.default_template().await?.is_some() {
        return Ok(());
    }
    let now = Utc::now();
    let row = store
        .insert_template(&TemplateRow {
            id: 0,
            name: "默认告警模板".to_string(),
            channel_type: "generic".to_string(),
            body: DEFAULT_TEMPLATE_BODY.to_string(),
            is_default: true,
            created_at: now,
            updated_at: now,
        })
        .await?;
    tracing::info!(template_id = row.id, "seeded default notification template");
    Ok(())
}

/// Seed runtime settings that background tasks read from the store.
pub async fn ensure_default_settings(store: &AlertStore) -> Result<()> {
    if store
        .get_system_config(CONFIG_KEY_RETENTION_DAYS)
        .await?
        .is_none()
    {
        store
            .set_system_config(CONFIG_KEY_RETENTION_DAYS, &DEFAULT_RETENTION_DAYS.to_string())
            .await?;
        tracing::info!(days = DEFAULT_RETENTION_DAYS, "seeded default retention setting");
    }
    Ok(())
}
