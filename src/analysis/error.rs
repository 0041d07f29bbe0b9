//! Error taxonomy for the orchestration engine
//!
//! Three layers: `StepError` is what a step (or the timeout wrapper around
//! it) produces for one attempt; `CacheError`/`TrackerError` are internal
//! orchestration faults that get logged and absorbed, never surfaced to
//! callers; `AnalysisError` is the discriminated, caller-facing terminal
//! form carrying kind, message, and a retryability flag.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{AnalysisKey, AnalysisType};

/// Failure of a single step attempt.
#[derive(Debug, Error)]
pub enum StepError {
    /// The step raised a domain failure.
    #[error("step execution failed: {message}")]
    Execution { message: String },

    /// The orchestrator's external timeout elapsed before the step returned.
    #[error("step timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Reading the project through the `ProjectReader` failed.
    #[error("project read failed: {0}")]
    Io(#[from] anyhow::Error),

    /// The request itself is unusable (missing project, bad option shape).
    /// Never retried: the same input would fail the same way.
    #[error("invalid step input: {message}")]
    InvalidInput { message: String },
}

impl StepError {
    pub fn execution(message: impl Into<String>) -> Self {
        StepError::Execution {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        StepError::InvalidInput {
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, StepError::InvalidInput { .. })
    }
}

/// Errors from step registration and resolution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a step is already registered for analysis type: {0}")]
    DuplicateRegistration(AnalysisType),

    #[error("no step registered for analysis type: {0}")]
    StepNotFound(AnalysisType),
}

/// Internal result-cache fault. Logged by the orchestrator and treated as a
/// cache miss; never surfaced as a domain error.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("result cache lock poisoned")]
    Poisoned,
}

/// Internal execution-tracker fault. Logged by the orchestrator, which then
/// treats the key as absent and re-executes.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("execution tracker lock poisoned")]
    Poisoned,

    /// The leader's channel closed before an outcome was published.
    #[error("in-flight execution vanished before publishing an outcome")]
    LeaderGone,
}

/// Terminal, caller-facing analysis failure.
///
/// `Clone` so the identical outcome can be broadcast to every single-flight
/// subscriber of a key.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum AnalysisError {
    /// No step is registered for the requested type. Fatal, never retried,
    /// surfaced before any cache or tracker side effect.
    #[error("no step registered for analysis type: {analysis_type}")]
    StepNotFound { analysis_type: AnalysisType },

    /// The step kept failing until the retry budget ran out.
    #[error("{analysis_type} analysis failed after {attempts} attempt(s): {message}")]
    ExecutionFailed {
        analysis_type: AnalysisType,
        attempts: u32,
        message: String,
    },

    /// Every attempt exceeded its allotted time.
    #[error("{analysis_type} analysis timed out after {attempts} attempt(s) of {timeout_ms}ms")]
    Timeout {
        analysis_type: AnalysisType,
        attempts: u32,
        timeout_ms: u64,
    },

    /// Status or retry lookup for a key with no active or retained record.
    #[error("no analysis record for key {key}")]
    RecordNotFound { key: AnalysisKey },

    /// Orchestration-internal failure that survived re-execution. Carries no
    /// domain meaning.
    #[error("internal orchestration failure: {message}")]
    Internal { message: String },
}

impl AnalysisError {
    /// Stable discriminant for callers mapping errors onto wire formats.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::StepNotFound { .. } => "step-not-found",
            AnalysisError::ExecutionFailed { .. } => "execution-failed",
            AnalysisError::Timeout { .. } => "timeout",
            AnalysisError::RecordNotFound { .. } => "record-not-found",
            AnalysisError::Internal { .. } => "internal",
        }
    }

    /// Whether an explicit retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AnalysisError::StepNotFound { .. } | AnalysisError::RecordNotFound { .. } => false,
            AnalysisError::ExecutionFailed { .. }
            | AnalysisError::Timeout { .. }
            | AnalysisError::Internal { .. } => true,
        }
    }
}
