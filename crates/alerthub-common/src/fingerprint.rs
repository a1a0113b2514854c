//! Deterministic alert fingerprints.
//!
//! The same `(source_id, title, labels)` always hashes to the same digest,
//! which is stored as the alert's `external_id` so one logical alert reuses
//! one row for the whole firing episode. Labels are serialized with keys in
//! lexicographic order, so insertion order never changes the digest.

use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

/// Fingerprint for webhook-ingested alerts: `source_id | title | labels`.
pub fn key(source_id: i64, title: &str, labels: &HashMap<String, String>) -> String {
    let payload = format!("{}|{}|{}", source_id, title, canonical_labels(labels));
    digest(&payload)
}

/// Fingerprint for scheduler-evaluated series:
/// `source_id | rule_id | title | labels [| result_index]`.
///
/// The rule ID is included so the same series under different rules yields
/// different alerts. The result index is appended only when the labels carry
/// neither `instance` nor `job`, to disambiguate anonymous series within one
/// query response; in that case key stability across runs depends on result
/// order.
pub fn series_key(
    source_id: i64,
    rule_id: i64,
    title: &str,
    labels: &HashMap<String, String>,
    result_index: usize,
) -> String {
    let mut payload = format!(
        "{}|{}|{}|{}",
        source_id,
        rule_id,
        title,
        canonical_labels(labels)
    );
    if labels.get("instance").map_or(true, String::is_empty)
        && labels.get("job").map_or(true, String::is_empty)
    {
        let _ = write!(payload, "|{result_index}");
    }
    digest(&payload)
}

fn canonical_labels(labels: &HashMap<String, String>) -> String {
    let sorted: BTreeMap<&str, &str> = labels
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    serde_json::to_string(&sorted).unwrap_or_else(|_| "{}".to_string())
}

fn digest(payload: &str) -> String {
    let hash = Sha256::digest(payload.as_bytes());
    let mut out = String::with_capacity(64);
    for b in hash {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn key_is_stable() {
        let l = labels(&[("job", "api"), ("instance", "host:9100")]);
        assert_eq!(key(1, "cpu high", &l), key(1, "cpu high", &l));
    }

    #[test]
    fn key_is_order_independent() {
        let a = labels(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let mut b = HashMap::new();
        b.insert("c".to_string(), "3".to_string());
        b.insert("a".to_string(), "1".to_string());
        b.insert("b".to_string(), "2".to_string());
        assert_eq!(key(1, "t", &a), key(1, "t", &b));
    }

    #[test]
    fn key_changes_with_any_input() {
        let l = labels(&[("job", "api")]);
        let base = key(1, "t", &l);
        assert_ne!(base, key(2, "t", &l));
        assert_ne!(base, key(1, "u", &l));
        assert_ne!(base, key(1, "t", &labels(&[("job", "web")])));
    }

    #[test]
    fn series_key_differs_per_rule() {
        let l = labels(&[("instance", "host:9100")]);
        assert_ne!(
            series_key(1, 10, "t", &l, 0),
            series_key(1, 11, "t", &l, 0)
        );
    }

    #[test]
    fn result_index_only_used_for_anonymous_series() {
        // With instance present the index is ignored.
        let named = labels(&[("instance", "host:9100")]);
        assert_eq!(
            series_key(1, 1, "t", &named, 0),
            series_key(1, 1, "t", &named, 5)
        );

        // Without instance/job each index yields its own key.
        let anon = labels(&[("mount", "/data")]);
        assert_ne!(
            series_key(1, 1, "t", &anon, 0),
            series_key(1, 1, "t", &anon, 1)
        );

        // Empty-string instance counts as absent.
        let empty = labels(&[("instance", ""), ("mount", "/data")]);
        assert_ne!(
            series_key(1, 1, "t", &empty, 0),
            series_key(1, 1, "t", &empty, 1)
        );
    }

    #[test]
    fn webhook_and_series_forms_differ() {
        let l = labels(&[("instance", "host:9100")]);
        assert_ne!(key(1, "t", &l), series_key(1, 1, "t", &l, 0));
    }

    #[test]
    fn digest_is_lowercase_hex() {
        let d = key(1, "t", &HashMap::new());
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
