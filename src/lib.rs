//! codescope - concurrent orchestration engine for source-project analyses
//!
//! This library coordinates independent, pluggable analysis steps (project
//! structure, code quality, security, performance, architecture, tech stack)
//! against a source project, aggregating their outputs while handling
//! caching, deduplication, retries, and status tracking.
//!
//! # Core Concepts
//!
//! - **Analysis steps**: pluggable units of work implementing one analysis
//!   domain behind the [`AnalysisStep`] trait
//! - **Single-flight**: concurrent requests for the same analysis share one
//!   execution; followers receive the leader's outcome
//! - **TTL caching**: completed results are served without re-execution
//!   until their type-dependent time-to-live elapses
//!
//! # Example Usage
//!
//! ```ignore
//! use codescope::{AnalysisOrchestrator, AnalysisType, LocalProjectReader, OrchestratorConfig};
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = AnalysisOrchestrator::with_default_steps(
//!     OrchestratorConfig::default(),
//!     Arc::new(LocalProjectReader::new()),
//! );
//!
//! // One domain...
//! let result = orchestrator
//!     .execute_analysis("/path/to/project", AnalysisType::TechStack, BTreeMap::new())
//!     .await?;
//! println!("tech stack: {}", result.payload);
//!
//! // ...or everything at once.
//! let report = orchestrator
//!     .perform_comprehensive("/path/to/project", BTreeMap::new())
//!     .await;
//! println!("{} analyses succeeded", report.succeeded().len());
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`analysis`]: orchestrator, registry, cache, single-flight tracker,
//!   data model, and error taxonomy
//! - [`steps`]: the six reference step implementations
//! - [`fs`]: read-only project access used by steps
//! - [`progress`]: lifecycle events for caller-side notification
//! - [`config`]: execution policy (timeouts, TTLs, retry/backoff)

// Public modules
pub mod analysis;
pub mod config;
pub mod fs;
pub mod progress;
pub mod steps;
pub mod util;

// Re-export key types for convenient access
pub use analysis::cache::ResultCache;
pub use analysis::error::{AnalysisError, CacheError, RegistryError, StepError, TrackerError};
pub use analysis::orchestrator::AnalysisOrchestrator;
pub use analysis::registry::StepRegistry;
pub use analysis::step::{AnalysisOptions, AnalysisStep};
pub use analysis::tracker::{ActiveExecutionTracker, AnalysisOutcome, ExecutionSlot, OutcomeWaiter};
pub use analysis::types::{
    AnalysisKey, AnalysisRecord, AnalysisRequest, AnalysisResult, AnalysisStatus, AnalysisType,
    ComprehensiveReport,
};
pub use config::{ConfigError, OrchestratorConfig, RetryPolicy};
pub use fs::{LocalProjectReader, MockProjectReader, ProjectReader, WalkConfig};
pub use progress::{AnalysisEvent, LoggingHandler, NoOpHandler, ProgressHandler};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
