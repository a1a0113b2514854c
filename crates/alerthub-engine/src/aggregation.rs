//! Helpers for merging same-type alerts along one dimension.
//!
//! Two alerts are "the same type" when their labels match after removing
//! the aggregation dimension's keys. The per-alert dimension value (e.g.
//! a hostname) is collected into the aggregated notification.

use std::collections::{BTreeMap, HashMap, HashSet};

/// Label keys that identify the aggregation dimension and are excluded
/// from type comparison. Well-known dimensions also exclude `instance`,
/// which usually embeds the same information.
pub fn dimension_keys(aggregate_by: &str) -> Vec<String> {
    match aggregate_by.to_lowercase().as_str() {
        "hostname" => vec!["hostname".into(), "host".into(), "instance".into()],
        "ip" => vec!["ip".into(), "instance".into()],
        "port" => vec!["port".into(), "instance".into()],
        _ => vec![aggregate_by.to_string()],
    }
}

/// Stable serialization of the labels minus the dimension keys; equal
/// fingerprints mean "same type".
pub fn type_fingerprint(labels: &HashMap<String, String>, aggregate_by: &str) -> String {
    let excluded: HashSet<String> = dimension_keys(aggregate_by).into_iter().collect();
    let kept: BTreeMap<&str, &str> = labels
        .iter()
        .filter(|(k, _)| !excluded.contains(k.as_str()))
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let mut out = String::new();
    for (k, v) in kept {
        out.push_str(k);
        out.push('=');
        out.push_str(v);
        out.push(';');
    }
    out
}

/// The alert's value along the aggregation dimension. Well-known
/// dimensions fall back to dissecting `instance` (`host:port`).
pub fn aggregation_key(labels: &HashMap<String, String>, aggregate_by: &str) -> String {
    let get = |k: &str| labels.get(k).cloned().unwrap_or_default();
    match aggregate_by.to_lowercase().as_str() {
        "hostname" => {
            let v = get("hostname");
            if !v.is_empty() {
                return v;
            }
            let v = get("host");
            if !v.is_empty() {
                return v;
            }
            let instance = get("instance");
            instance.split(':').next().unwrap_or_default().to_string()
        }
        "ip" => {
            let v = get("ip");
            if !v.is_empty() {
                return v;
            }
            let instance = get("instance");
            instance.split(':').next().unwrap_or_default().to_string()
        }
        "port" => {
            let v = get("port");
            if !v.is_empty() {
                return v;
            }
            let instance = get("instance");
            match instance.rfind(':') {
                Some(idx) if idx + 1 < instance.len() => instance[idx + 1..].to_string(),
                _ => String::new(),
            }
        }
        _ => get(aggregate_by),
    }
}

/// True when `a` and `b` agree on every label outside the dimension keys.
pub fn labels_same_type(
    a: &HashMap<String, String>,
    b: &HashMap<String, String>,
    aggregate_by: &str,
) -> bool {
    let excluded: HashSet<String> = dimension_keys(aggregate_by).into_iter().collect();
    for (k, v) in a {
        if excluded.contains(k.as_str()) {
            continue;
        }
        if b.get(k) != Some(v) {
            return false;
        }
    }
    for k in b.keys() {
        if excluded.contains(k.as_str()) {
            continue;
        }
        if !a.contains_key(k) {
            return false;
        }
    }
    true
}
