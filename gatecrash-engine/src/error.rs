use std::time::Duration;
use thiserror::Error;

/// Fatal analysis failures. Any of these abort the target.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("failed to fetch login page: {0}")]
    FetchFailed(#[from] reqwest::Error),

    #[error("no form element found: {0}")]
    NoFormFound(String),

    #[error("page does not look like a login form")]
    NotALoginPage,

    #[error("unable to resolve form submit path")]
    NoSubmitPath,

    #[error("unable to identify username/password fields")]
    NoLoginParameters,
}

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("baseline probe failed: {0}")]
    FetchFailed(#[from] reqwest::Error),

    #[error("failure page length is not stable ({first} vs {second} bytes)")]
    UnstableBaseline { first: usize, second: usize },
}

#[derive(Error, Debug)]
pub enum DictionaryError {
    #[error("merged dictionary is empty")]
    EmptyDictionary,

    #[error("wordlist IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Umbrella error for a single target's pipeline. Caught at the
/// orchestrator boundary; never aborts a multi-target run.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("calibration failed: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("dictionary build failed: {0}")]
    Dictionary(#[from] DictionaryError),

    #[error("target budget of {0:?} exceeded")]
    Timeout(Duration),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AuditError>;
