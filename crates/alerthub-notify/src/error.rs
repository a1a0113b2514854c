/// Errors from the notification subsystem.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Channel configuration is missing a required field or malformed.
    /// Treated as non-transient: the retry loop stops on first sight.
    #[error("invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// The channel type tag has no registered sender.
    #[error("unknown channel type '{0}'")]
    UnknownChannelType(String),

    /// HTTP transport failure talking to the external service.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The external API rejected the request.
    #[error("{service} api error: status={status}, body={body}")]
    Api {
        service: String,
        status: u16,
        body: String,
    },

    /// Rendering a notification template failed.
    #[error("template render error: {0}")]
    Template(String),

    #[error("{0}")]
    Other(String),
}
