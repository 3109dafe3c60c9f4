use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("no admissible sources: {0}")]
    NoAdmissibleSources(String),

    #[error("all sources failed: {0}")]
    AllSourcesFailed(String),

    #[error("fusion requires at least one successful result")]
    NoSuccessfulResults,

    #[error("vision extraction failed: {0}")]
    Vision(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("catalog access failed: {0}")]
    Catalog(String),
}

pub type Result<T> = std::result::Result<T, ProcessingError>;
