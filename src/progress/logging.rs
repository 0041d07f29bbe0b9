//! Progress handler that forwards events to `tracing`

use tracing::{info, warn};

use super::handler::{AnalysisEvent, ProgressHandler};

/// Logs every lifecycle event at an appropriate level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_event(&self, event: &AnalysisEvent) {
        match event {
            AnalysisEvent::Started { analysis_type, key } => {
                info!(%analysis_type, key = key.short(), "analysis started");
            }
            AnalysisEvent::CacheHit { analysis_type, key } => {
                info!(%analysis_type, key = key.short(), "cache hit");
            }
            AnalysisEvent::JoinedInFlight { analysis_type, key } => {
                info!(%analysis_type, key = key.short(), "joined in-flight analysis");
            }
            AnalysisEvent::AttemptFailed {
                analysis_type,
                attempt,
                max_attempts,
                error,
            } => {
                warn!(
                    %analysis_type,
                    attempt,
                    max_attempts,
                    error = %error,
                    "analysis attempt failed"
                );
            }
            AnalysisEvent::Completed {
                analysis_type,
                key,
                attempts,
                duration,
            } => {
                info!(
                    %analysis_type,
                    key = key.short(),
                    attempts,
                    duration_ms = duration.as_millis() as u64,
                    "analysis completed"
                );
            }
            AnalysisEvent::Failed {
                analysis_type,
                key,
                attempts,
                error,
            } => {
                warn!(
                    %analysis_type,
                    key = key.short(),
                    attempts,
                    error = %error,
                    "analysis failed"
                );
            }
        }
    }
}
