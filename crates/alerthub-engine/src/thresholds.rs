//! Multi-level threshold grading.

use serde::{Deserialize, Serialize};

/// One level in a rule's ordered threshold list. A matched level overrides
/// the alert severity and may carry its own channel routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdLevel {
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub channel_ids: Vec<i64>,
}

/// Parse the rule's `thresholds` JSON. `None` means thresholds are
/// disabled: empty, literally `"null"`/`"[]"`, or unparseable input all
/// disable grading.
pub fn parse_thresholds(raw: &str) -> Option<Vec<ThresholdLevel>> {
    if raw.is_empty() || raw == "[]" || raw == "null" {
        return None;
    }
    let levels: Vec<ThresholdLevel> = serde_json::from_str(raw).ok()?;
    if levels.is_empty() {
        None
    } else {
        Some(levels)
    }
}

/// First-hit matching in declared order. Unknown operators compare with `>`.
pub fn match_threshold<'a>(
    levels: &'a [ThresholdLevel],
    value: f64,
) -> Option<&'a ThresholdLevel> {
    levels.iter().find(|l| match l.operator.as_str() {
        ">" => value > l.value,
        ">=" => value >= l.value,
        "<" => value < l.value,
        "<=" => value <= l.value,
        "==" => value == l.value,
        "!=" => value != l.value,
        _ => value > l.value,
    })
}
