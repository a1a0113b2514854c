use crate::error::QueryError;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Instant-query client for the Prometheus HTTP API
/// (`GET /api/v1/query`). VictoriaMetrics serves the same endpoint.
pub struct PrometheusClient {
    base_url: String,
    client: reqwest::Client,
}

/// One labeled sample from an instant query. Prometheus returns the sample
/// value as a string; [`QuerySeries::sample_value`] parses it.
#[derive(Debug, Clone)]
pub struct QuerySeries {
    pub labels: HashMap<String, String>,
    pub timestamp: f64,
    pub value: String,
}

impl QuerySeries {
    /// The sample as a float, `0.0` when the string does not parse.
    pub fn sample_value(&self) -> f64 {
        self.value.parse().unwrap_or(0.0)
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    data: ApiData,
    #[serde(default)]
    error: String,
}

#[derive(Deserialize, Default)]
struct ApiData {
    #[serde(default)]
    result: Vec<ApiResult>,
}

#[derive(Deserialize)]
struct ApiResult {
    #[serde(default)]
    metric: HashMap<String, String>,
    /// `[ <unix timestamp>, "<value>" ]`
    #[serde(default)]
    value: Vec<serde_json::Value>,
}

impl PrometheusClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(QUERY_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Evaluate `expr` at the current instant and return all series.
    pub async fn query(&self, expr: &str) -> Result<Vec<QuerySeries>, QueryError> {
        let url = format!("{}/api/v1/query", self.base_url);
        let now = chrono::Utc::now().timestamp().to_string();

        let resp = self
            .client
            .get(&url)
            .query(&[("query", expr), ("time", now.as_str())])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(QueryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ApiResponse = serde_json::from_str(&body)?;
        if parsed.status != "success" {
            return Err(QueryError::Backend(parsed.error));
        }

        Ok(parsed
            .data
            .result
            .into_iter()
            .map(|r| {
                let timestamp = r
                    .value
                    .first()
                    .and_then(serde_json::Value::as_f64)
                    .unwrap_or(0.0);
                let value = r
                    .value
                    .get(1)
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("")
                    .to_string();
                QuerySeries {
                    labels: r.metric,
                    timestamp,
                    value,
                }
            })
            .collect())
    }
}
