use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::Metric;

#[derive(Error, Debug)]
pub enum ConsolidateError {
    #[error("pipeline stage '{stage}' failed: {reason}")]
    StageFailure { stage: String, reason: String },

    #[error("non-monotonic {metric} for {location} at {date}: {value} < {previous}")]
    NonMonotonic {
        location: String,
        metric: Metric,
        date: NaiveDate,
        value: u64,
        previous: u64,
    },

    #[error("merge rejected for {location} at {date}: {reason}")]
    Regression {
        location: String,
        date: NaiveDate,
        reason: String,
    },

    #[error("unrecognized vaccine name(s): {0:?}")]
    UnrecognizedCategory(Vec<String>),

    #[error("observation for '{got}' merged into series for '{expected}'")]
    LocationMismatch { expected: String, got: String },

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

    #[error("Missing required field: {0}")]
    MissingField(String),
}

impl ConsolidateError {
    pub fn stage(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StageFailure {
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConsolidateError>;
