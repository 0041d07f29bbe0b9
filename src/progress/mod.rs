//! Orchestration lifecycle events
//!
//! The orchestrator emits an [`AnalysisEvent`] at each lifecycle edge of an
//! execution. Callers wanting notification delivery implement
//! [`ProgressHandler`] and bridge events onto their own transport; this core
//! ships only a no-op handler and a `tracing`-backed one.

mod handler;
mod logging;

pub use handler::{AnalysisEvent, NoOpHandler, ProgressHandler};
pub use logging::LoggingHandler;
