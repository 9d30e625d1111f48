use thiserror::Error;

/// Halo stats API error types
#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error {status}: {body_snippet}")]
    Http {
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("JSON serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Player not found: {0}")]
    PlayerNotFound(String),

    #[error("No matches found for this player")]
    NoMatches,

    #[error("Player {0} did not take part in match {1}")]
    PlayerNotInMatch(String, String),

    #[error("No Xbox Live credential available for player lookups - authenticate again")]
    MissingXblToken,
}

pub type Result<T> = std::result::Result<T, StatsError>;
