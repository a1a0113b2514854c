/// Errors from pull query clients.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("query transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-2xx HTTP status.
    #[error("query failed: HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend answered 200 but reported an error in the payload.
    #[error("backend error: {0}")]
    Backend(String),

    /// The response body was not the expected JSON shape.
    #[error("malformed query response: {0}")]
    Json(#[from] serde_json::Error),
}
