/// Errors that can occur talking to the external catalog or blob storage.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited by catalog API")]
    RateLimit,

    #[error("Snapshot not found at '{path}'")]
    NotFound { path: String },

    #[error("Credentials rejected and refresh failed: {0}")]
    NeedsCredentials(String),

    #[error("Catalog API is unavailable: {0}")]
    ServerClosed(String),

    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SourceError {
    /// Whether retrying the same call could plausibly succeed.
    ///
    /// Auth failures and missing snapshots are not transient: the former
    /// needs fresh credentials, the latter a different input.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::NeedsCredentials(_) | Self::NotFound { .. } | Self::Config(_)
        )
    }
}
