pub mod analyzer;
pub mod captcha;
pub mod config;
pub mod dictionary;
pub mod engine;
pub mod error;
pub mod headers;
pub mod http;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod probe;

pub use config::AuditConfig;
pub use error::{AnalysisError, AuditError, CalibrationError, DictionaryError};
pub use logging::RunLog;
pub use model::{Baseline, Candidate, Target, TargetOutcome, Verdict};
pub use orchestrator::Orchestrator;
