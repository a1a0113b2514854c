//! Notification body rendering.
//!
//! Two strategies: a full Handlebars engine for stored templates, and a
//! literal placeholder substitution used when the engine fails. Templates
//! see the fields of [`AlertTemplateData`] under their serialized names,
//! e.g. `{{Title}}`, `{{#if IsRecovery}}...{{/if}}`, `{{Labels.job}}`.

use crate::error::NotifyError;
use handlebars::Handlebars;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Everything a notification template can reference.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlertTemplateData {
    #[serde(rename = "AlertID")]
    pub alert_id: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Severity")]
    pub severity: String,
    #[serde(rename = "Labels")]
    pub labels: HashMap<String, String>,
    #[serde(rename = "StartAt")]
    pub start_at: String,
    #[serde(rename = "SentAt")]
    pub sent_at: String,
    #[serde(rename = "SourceType")]
    pub source_type: String,
    #[serde(rename = "Description")]
    pub description: String,
    /// The trigger value (e.g. the query result), as a string.
    #[serde(rename = "Value")]
    pub value: String,
    #[serde(rename = "IsRecovery")]
    pub is_recovery: bool,
    /// Resolution time; empty while firing.
    #[serde(rename = "ResolvedAt")]
    pub resolved_at: String,
    #[serde(rename = "RuleDescription")]
    pub rule_description: String,
}

/// Render `body` with the full template engine.
pub fn render_template(body: &str, data: &AlertTemplateData) -> Result<String, NotifyError> {
    let mut reg = Handlebars::new();
    reg.register_escape_fn(handlebars::no_escape);
    reg.render_template(body, data)
        .map_err(|e| NotifyError::Template(e.to_string()))
}

static LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\.Labels\.(\w+)\}\}").unwrap());

/// Literal substitution fallback: replaces `{{.AlertID}}`, `{{.Title}}`,
/// `{{.Severity}}` and `{{.Labels.<key>}}` and leaves everything else
/// untouched. Unknown label keys become empty strings.
pub fn render_body(
    body: &str,
    labels: &HashMap<String, String>,
    alert_id: &str,
    title: &str,
    severity: &str,
) -> String {
    let out = body
        .replace("{{.AlertID}}", alert_id)
        .replace("{{.Title}}", title)
        .replace("{{.Severity}}", severity);
    LABEL_RE
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            labels.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> AlertTemplateData {
        AlertTemplateData {
            alert_id: "a-1".to_string(),
            title: "disk full".to_string(),
            severity: "critical".to_string(),
            labels: HashMap::from([
                ("job".to_string(), "node".to_string()),
                ("instance".to_string(), "h1:9100".to_string()),
            ]),
            start_at: "2024-05-01 10:00:00".to_string(),
            value: "97.5".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn full_engine_renders_fields_and_conditionals() {
        let body = "{{#if IsRecovery}}OK{{else}}FIRING{{/if}} {{Title}} ({{Severity}}) value={{Value}} job={{Labels.job}}";
        let out = render_template(body, &data()).unwrap();
        assert_eq!(out, "FIRING disk full (critical) value=97.5 job=node");

        let mut recovered = data();
        recovered.is_recovery = true;
        let out = render_template(body, &recovered).unwrap();
        assert!(out.starts_with("OK "));
    }

    #[test]
    fn full_engine_reports_syntax_errors() {
        let err = render_template("{{#if}} broken", &data()).unwrap_err();
        assert!(matches!(err, NotifyError::Template(_)));
    }

    #[test]
    fn fallback_substitutes_placeholders() {
        let body = "id={{.AlertID}} t={{.Title}} s={{.Severity}} job={{.Labels.job}} missing={{.Labels.nope}}";
        let d = data();
        let out = render_body(body, &d.labels, &d.alert_id, &d.title, &d.severity);
        assert_eq!(out, "id=a-1 t=disk full s=critical job=node missing=");
    }

    #[test]
    fn fallback_leaves_unknown_tags_alone() {
        let d = data();
        let out = render_body("{{.StartAt}} stays", &d.labels, &d.alert_id, &d.title, &d.severity);
        assert_eq!(out, "{{.StartAt}} stays");
    }
}
