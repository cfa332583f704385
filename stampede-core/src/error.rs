use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("No load profiles configured")]
    NoProfiles,

    #[error("Load profile \"{0}\" is defined more than once")]
    DuplicateProfile(String),

    #[error("Ramping profile \"{0}\" has no stages")]
    EmptyStages(String),

    #[error("Load profile \"{0}\" runs for longer than a year")]
    TooLong(String),

    #[error("Arrival-rate profile \"{0}\" has a zero time unit")]
    ZeroTimeUnit(String),

    #[error("Arrival-rate profile \"{name}\": max_concurrency ({max}) is lower than pre_allocated ({pre_allocated})")]
    ConcurrencyBounds {
        name: String,
        pre_allocated: u32,
        max: u32,
    },

    #[error("Invalid threshold expression \"{expr}\": {reason}")]
    InvalidThreshold { expr: String, reason: String },

    #[error("Invalid test configuration: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
