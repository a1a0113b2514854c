//! Pull-side query clients for time-series datasources.
//!
//! [`prometheus::PrometheusClient`] speaks the Prometheus HTTP API and is
//! also used for VictoriaMetrics, which exposes the same endpoints.
//! Dispatch is by datasource type tag; see [`supports_pull`].

pub mod error;
pub mod prometheus;

pub use error::QueryError;
pub use prometheus::{PrometheusClient, QuerySeries};

/// Whether the scheduler can pull-evaluate the given datasource type.
/// Push-only types (elasticsearch, doris) arrive via webhook ingress.
pub fn supports_pull(source_type: &str) -> bool {
    matches!(source_type, "prometheus" | "victoriametrics")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_support_by_type_tag() {
        assert!(supports_pull("prometheus"));
        assert!(supports_pull("victoriametrics"));
        assert!(!supports_pull("elasticsearch"));
        assert!(!supports_pull("doris"));
        assert!(!supports_pull(""));
    }
}
