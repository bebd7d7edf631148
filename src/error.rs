use thiserror::Error;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Stage-level error kinds for the classify/search/scrape pipeline.
///
/// Per-record failures inside the scrape loop are NOT errors — they are
/// contained as `PageOutcome` sentinels and never reach this type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Search provider error: {0}")]
    Provider(String),

    #[error("No results found")]
    EmptyResult,

    #[error("Input file '{0}' not found")]
    MissingInput(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("No URLs to scrape")]
    EmptyInput,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),
}

// Conversion implementations for common error types
impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Storage(err.to_string())
    }
}

impl From<toml::de::Error> for PipelineError {
    fn from(err: toml::de::Error) -> Self {
        PipelineError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::Provider(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for PipelineError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        PipelineError::Browser(err.to_string())
    }
}
