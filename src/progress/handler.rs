//! Progress handler trait and events

use std::time::Duration;

use crate::analysis::types::{AnalysisKey, AnalysisType};

/// Events emitted during an analysis execution
#[derive(Debug, Clone)]
pub enum AnalysisEvent {
    /// A leader started executing this key
    Started {
        analysis_type: AnalysisType,
        key: AnalysisKey,
    },

    /// A fresh cached result was served without invoking the step
    CacheHit {
        analysis_type: AnalysisType,
        key: AnalysisKey,
    },

    /// The caller joined an in-flight execution as a follower
    JoinedInFlight {
        analysis_type: AnalysisType,
        key: AnalysisKey,
    },

    /// One attempt failed; a retry follows if the budget allows
    AttemptFailed {
        analysis_type: AnalysisType,
        attempt: u32,
        max_attempts: u32,
        error: String,
    },

    /// Execution completed and the result was cached
    Completed {
        analysis_type: AnalysisType,
        key: AnalysisKey,
        attempts: u32,
        duration: Duration,
    },

    /// Execution failed terminally
    Failed {
        analysis_type: AnalysisType,
        key: AnalysisKey,
        attempts: u32,
        error: String,
    },
}

/// Trait for observing analysis lifecycle events
pub trait ProgressHandler: Send + Sync {
    /// Called when a lifecycle event occurs
    fn on_event(&self, event: &AnalysisEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_event(&self, _event: &AnalysisEvent) {
        // Intentionally empty
    }
}
