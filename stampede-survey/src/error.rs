use stampede_core::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurveyError {
    #[error("Invalid base URL {0}")]
    InvalidBaseUrl(String),

    #[error("SURVEY_ID is required for the respond journey")]
    MissingSurveyId,

    #[error("Could not read load configuration {path}: {reason}")]
    LoadConfig { path: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
