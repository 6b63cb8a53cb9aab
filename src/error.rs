use thiserror::Error;

/// Failure classes callers branch on. Everything else travels as `anyhow::Error`.
#[derive(Debug, Error)]
pub enum HunterError {
    /// Missing credentials, profile, or an invalid setting. Aborts the run.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No search provider is available")]
    ProviderUnavailable,

    /// One request or parse failed; the item counts as empty.
    #[error("Fetch failed for {target}: {message}")]
    Fetch { target: String, message: String },
}

impl HunterError {
    pub fn config(message: impl Into<String>) -> Self {
        HunterError::Configuration(message.into())
    }

    pub fn fetch(target: impl Into<String>, message: impl ToString) -> Self {
        HunterError::Fetch {
            target: target.into(),
            message: message.to_string(),
        }
    }
}
