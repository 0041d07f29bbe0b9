//! Analysis orchestration
//!
//! `AnalysisOrchestrator` is the top-level coordinator. It composes the step
//! registry, the TTL result cache, and the single-flight execution tracker
//! into three execution modes: single analysis, concurrent multi-analysis,
//! and comprehensive fan-out over every registered domain.
//!
//! # Architecture
//!
//! ```text
//! AnalysisOrchestrator
//!   ├── StepRegistry            (type -> Arc<dyn AnalysisStep>)
//!   ├── ResultCache             (key -> result, TTL-bounded)
//!   ├── ActiveExecutionTracker  (key -> single-flight leader/followers)
//!   └── history                 (key -> most recent terminal record)
//! ```
//!
//! One `execute_analysis` call walks: cache fast path, step resolution
//! (fail-fast, zero side effects for unknown types), single-flight join,
//! and — for the leader — a detached execution task applying the external
//! timeout and the retry/backoff policy before caching and publishing the
//! outcome. Leader work runs in its own `tokio` task so a caller cancelling
//! its wait never cancels the execution other subscribers depend on.
//!
//! # Thread Safety
//!
//! The orchestrator is `Clone` and cheap to share; all state is behind
//! `Arc`. Operations on one key never block operations on an unrelated key
//! beyond the short map-lock critical sections.

use chrono::Utc;
use futures_util::future::join_all;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{OrchestratorConfig, RetryPolicy};
use crate::fs::ProjectReader;
use crate::progress::{AnalysisEvent, ProgressHandler};

use super::cache::ResultCache;
use super::error::{AnalysisError, StepError};
use super::registry::StepRegistry;
use super::step::{AnalysisOptions, AnalysisStep};
use super::tracker::{ActiveExecutionTracker, ExecutionSlot};
use super::types::{
    AnalysisKey, AnalysisRecord, AnalysisRequest, AnalysisResult, AnalysisStatus, AnalysisType,
    ComprehensiveReport,
};

/// How often a caller re-enters the join flow after the in-flight execution
/// vanished underneath it before giving up.
const MAX_JOIN_REENTRIES: u32 = 3;

/// Per-call execution policy: config defaults overridden by the recognized
/// request options.
#[derive(Debug, Clone)]
struct ExecutionPlan {
    timeout: Duration,
    ttl: Duration,
    max_attempts: u32,
    bypass_cache: bool,
    retry: RetryPolicy,
}

impl ExecutionPlan {
    fn resolve(config: &OrchestratorConfig, request: &AnalysisRequest) -> Self {
        let options = AnalysisOptions::new(request.options.clone());

        Self {
            timeout: options
                .get_u64("timeout_ms")
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.timeout_for(request.analysis_type)),
            ttl: options
                .get_u64("ttl_ms")
                .map(Duration::from_millis)
                .unwrap_or_else(|| config.ttl_for(request.analysis_type)),
            max_attempts: options
                .get_u64("max_attempts")
                .map(|n| n as u32)
                .unwrap_or(config.retry.max_attempts)
                .max(1),
            bypass_cache: options.get_bool("bypass_cache").unwrap_or(false),
            retry: config.retry.clone(),
        }
    }
}

/// Top-level coordinator for pluggable project analyses.
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    config: Arc<OrchestratorConfig>,
    registry: Arc<StepRegistry>,
    cache: Arc<ResultCache>,
    tracker: Arc<ActiveExecutionTracker>,
    history: Arc<RwLock<HashMap<AnalysisKey, AnalysisRecord>>>,
    progress: Option<Arc<dyn ProgressHandler>>,
}

impl std::fmt::Debug for AnalysisOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisOrchestrator")
            .field("registered_types", &self.registry.list())
            .field("cached_results", &self.cache.len())
            .field("active_executions", &self.tracker.len())
            .finish()
    }
}

impl AnalysisOrchestrator {
    pub fn new(config: OrchestratorConfig, registry: StepRegistry) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            cache: Arc::new(ResultCache::new()),
            tracker: Arc::new(ActiveExecutionTracker::new()),
            history: Arc::new(RwLock::new(HashMap::new())),
            progress: None,
        }
    }

    /// Orchestrator wired with the six reference steps reading the project
    /// through `reader`.
    pub fn with_default_steps(config: OrchestratorConfig, reader: Arc<dyn ProjectReader>) -> Self {
        Self::new(config, StepRegistry::with_default_steps(reader))
    }

    pub fn with_progress_handler(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.progress = Some(handler);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registered_types(&self) -> Vec<AnalysisType> {
        self.registry.list()
    }

    pub fn cached_result_count(&self) -> usize {
        self.cache.len()
    }

    pub fn active_execution_count(&self) -> usize {
        self.tracker.len()
    }

    /// Runs one analysis, deduplicating against in-flight executions of the
    /// same key and serving fresh cached results without invoking the step.
    ///
    /// # Errors
    ///
    /// - `StepNotFound` if no step is registered for the type (surfaced
    ///   immediately, with no cache or tracker side effects)
    /// - `ExecutionFailed` / `Timeout` once the retry budget is exhausted
    pub async fn execute_analysis(
        &self,
        project_path: impl Into<PathBuf>,
        analysis_type: AnalysisType,
        options: BTreeMap<String, Value>,
    ) -> Result<AnalysisResult, AnalysisError> {
        let request = AnalysisRequest::new(project_path, analysis_type).with_options(options);
        self.execute_request(request).await
    }

    /// `execute_analysis` for a pre-built request.
    pub async fn execute_request(
        &self,
        request: AnalysisRequest,
    ) -> Result<AnalysisResult, AnalysisError> {
        let key = request.key();
        let plan = ExecutionPlan::resolve(&self.config, &request);

        // Resolve before touching cache or tracker: an unknown type must
        // fail with zero side effects.
        let step = match self.registry.resolve(request.analysis_type) {
            Ok(step) => step,
            Err(err) => {
                debug!(error = %err, "analysis rejected");
                return Err(AnalysisError::StepNotFound {
                    analysis_type: request.analysis_type,
                });
            }
        };

        for _ in 0..MAX_JOIN_REENTRIES {
            if !plan.bypass_cache {
                if let Some(hit) = self.cache_lookup(&key) {
                    debug!(
                        analysis_type = %request.analysis_type,
                        key = key.short(),
                        "serving cached analysis result"
                    );
                    self.emit(AnalysisEvent::CacheHit {
                        analysis_type: request.analysis_type,
                        key: key.clone(),
                    });
                    return Ok(hit);
                }
            }

            let slot = match self.tracker.begin_or_join(key.clone(), &request) {
                Ok(slot) => slot,
                Err(err) => {
                    warn!(
                        error = %err,
                        key = key.short(),
                        "execution tracker unavailable, running without single-flight"
                    );
                    return self.run_leader(step, request, key, plan).await;
                }
            };

            match slot {
                ExecutionSlot::Follower { waiter } => {
                    debug!(
                        analysis_type = %request.analysis_type,
                        key = key.short(),
                        "joining in-flight analysis"
                    );
                    self.emit(AnalysisEvent::JoinedInFlight {
                        analysis_type: request.analysis_type,
                        key: key.clone(),
                    });
                    match waiter.wait().await {
                        Ok(outcome) => return outcome,
                        Err(err) => {
                            warn!(error = %err, key = key.short(), "rejoining analysis");
                            continue;
                        }
                    }
                }
                ExecutionSlot::Leader { waiter } => {
                    // A publish may have landed between the cache check and
                    // the join; re-check so that window never turns into a
                    // second execution.
                    if !plan.bypass_cache {
                        if let Some(hit) = self.cache_lookup(&key) {
                            if let Err(err) = self.tracker.publish(&key, Ok(hit.clone())) {
                                warn!(error = %err, key = key.short(), "failed to clear slot");
                            }
                            return Ok(hit);
                        }
                    }

                    let leader = self.clone();
                    let leader_step = Arc::clone(&step);
                    let leader_request = request.clone();
                    let leader_key = key.clone();
                    let leader_plan = plan.clone();
                    // Detached: the execution outlives a cancelled caller so
                    // followers still receive a definitive outcome and the
                    // result is cached even if unconsumed here.
                    tokio::spawn(async move {
                        let _ = leader
                            .run_leader(leader_step, leader_request, leader_key, leader_plan)
                            .await;
                    });

                    match waiter.wait().await {
                        Ok(outcome) => return outcome,
                        Err(err) => {
                            warn!(error = %err, key = key.short(), "rejoining analysis");
                            continue;
                        }
                    }
                }
            }
        }

        Err(AnalysisError::Internal {
            message: format!(
                "single-flight join failed repeatedly for key {}",
                key.short()
            ),
        })
    }

    /// Executes each type concurrently and independently. A failure in one
    /// type never aborts or blocks the others; per-type outcomes are
    /// isolated in the returned map. Duplicate types are collapsed.
    pub async fn execute_multiple(
        &self,
        project_path: impl Into<PathBuf>,
        analysis_types: &[AnalysisType],
        options: BTreeMap<String, Value>,
    ) -> HashMap<AnalysisType, Result<AnalysisResult, AnalysisError>> {
        self.execute_fan_out(project_path.into(), analysis_types, options, None)
            .await
    }

    /// Runs every analysis type against the project in one fan-out call.
    /// Bounded by the configured comprehensive timeout as a backstop: types
    /// still pending at the deadline are reported as timed out without
    /// cancelling their underlying executions.
    pub async fn perform_comprehensive(
        &self,
        project_path: impl Into<PathBuf>,
        options: BTreeMap<String, Value>,
    ) -> ComprehensiveReport {
        let project_path = project_path.into();
        let started_at = Utc::now();
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.comprehensive_timeout;

        info!(project = %project_path.display(), "starting comprehensive analysis");

        let per_type = self
            .execute_fan_out(
                project_path.clone(),
                &AnalysisType::all(),
                options,
                Some(deadline),
            )
            .await;

        let failed = per_type.values().filter(|r| r.is_err()).count();
        info!(
            project = %project_path.display(),
            analyses = per_type.len(),
            failed,
            duration_ms = started.elapsed().as_millis() as u64,
            "comprehensive analysis finished"
        );

        ComprehensiveReport {
            project_path,
            per_type,
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Point-in-time record for a key: the active record while an execution
    /// is in flight, otherwise the retained record of the most recent run.
    pub fn get_status(&self, key: &AnalysisKey) -> Result<AnalysisRecord, AnalysisError> {
        match self.tracker.snapshot(key) {
            Ok(Some(record)) => return Ok(record),
            Ok(None) => {}
            Err(err) => warn!(error = %err, key = key.short(), "tracker snapshot failed"),
        }
        let history = self.history.read().unwrap_or_else(|e| e.into_inner());
        history
            .get(key)
            .cloned()
            .ok_or_else(|| AnalysisError::RecordNotFound { key: key.clone() })
    }

    /// Invalidates any cached result for the key and runs it again,
    /// bypassing the cache. Joins the in-flight execution if one is already
    /// running.
    pub async fn retry_analysis(
        &self,
        key: &AnalysisKey,
    ) -> Result<AnalysisResult, AnalysisError> {
        let record = self.get_status(key)?;
        if let Err(err) = self.cache.invalidate(key) {
            warn!(error = %err, key = key.short(), "cache invalidation failed");
        }

        let mut request = record.request;
        request.request_id = Uuid::new_v4();
        request
            .options
            .insert("bypass_cache".to_string(), Value::Bool(true));

        info!(
            analysis_type = %request.analysis_type,
            key = key.short(),
            "retrying analysis"
        );
        self.execute_request(request).await
    }

    /// Drops the cached result for one key.
    pub fn invalidate(&self, key: &AnalysisKey) {
        if let Err(err) = self.cache.invalidate(key) {
            warn!(error = %err, key = key.short(), "cache invalidation failed");
        }
    }

    /// Drops every cached result.
    pub fn invalidate_all(&self) {
        if let Err(err) = self.cache.invalidate_all() {
            warn!(error = %err, "cache flush failed");
        }
    }

    async fn execute_fan_out(
        &self,
        project_path: PathBuf,
        analysis_types: &[AnalysisType],
        options: BTreeMap<String, Value>,
        deadline: Option<tokio::time::Instant>,
    ) -> HashMap<AnalysisType, Result<AnalysisResult, AnalysisError>> {
        let mut seen = HashSet::new();
        let handles: Vec<(AnalysisType, JoinHandle<Result<AnalysisResult, AnalysisError>>)> =
            analysis_types
                .iter()
                .copied()
                .filter(|t| seen.insert(*t))
                .map(|analysis_type| {
                    let orchestrator = self.clone();
                    let project_path = project_path.clone();
                    let options = options.clone();
                    let handle = tokio::spawn(async move {
                        orchestrator
                            .execute_analysis(project_path, analysis_type, options)
                            .await
                    });
                    (analysis_type, handle)
                })
                .collect();

        match deadline {
            None => {
                join_all(handles.into_iter().map(|(analysis_type, handle)| async move {
                    (analysis_type, flatten_join(analysis_type, handle.await))
                }))
                .await
                .into_iter()
                .collect()
            }
            Some(deadline) => {
                let budget_ms = self.config.comprehensive_timeout.as_millis() as u64;
                let mut per_type = HashMap::with_capacity(handles.len());
                for (analysis_type, mut handle) in handles {
                    let outcome = match tokio::time::timeout_at(deadline, &mut handle).await {
                        Ok(join_result) => flatten_join(analysis_type, join_result),
                        Err(_) => {
                            // Stop waiting, but leave the leader task alone:
                            // other subscribers may still be counting on it.
                            handle.abort();
                            warn!(
                                %analysis_type,
                                "comprehensive deadline elapsed while awaiting analysis"
                            );
                            Err(AnalysisError::Timeout {
                                analysis_type,
                                attempts: 0,
                                timeout_ms: budget_ms,
                            })
                        }
                    };
                    per_type.insert(analysis_type, outcome);
                }
                per_type
            }
        }
    }

    /// Leader-side execution: attempts with timeout and backoff, caching on
    /// success, record retention, and outcome publication.
    async fn run_leader(
        &self,
        step: Arc<dyn AnalysisStep>,
        request: AnalysisRequest,
        key: AnalysisKey,
        plan: ExecutionPlan,
    ) -> Result<AnalysisResult, AnalysisError> {
        self.emit(AnalysisEvent::Started {
            analysis_type: request.analysis_type,
            key: key.clone(),
        });
        if let Err(err) = self.tracker.mark_running(&key) {
            warn!(error = %err, key = key.short(), "failed to mark record running");
        }
        debug!(
            analysis_type = %request.analysis_type,
            step = step.description(),
            key = key.short(),
            "executing analysis step"
        );

        let started_at = Utc::now();
        let started = Instant::now();
        let (outcome, attempts) = self.run_attempts(&step, &request, &key, &plan).await;

        // Retain the terminal record before clearing the active entry so a
        // status poll never lands in a gap between the two.
        self.retain_record(AnalysisRecord {
            key: key.clone(),
            request: request.clone(),
            status: if outcome.is_ok() {
                AnalysisStatus::Completed
            } else {
                AnalysisStatus::Failed
            },
            started_at: Some(started_at),
            completed_at: Some(Utc::now()),
            attempt_count: attempts,
            error: outcome.as_ref().err().map(|e| e.to_string()),
            subscribers: 0,
        });

        match &outcome {
            Ok(_) => self.emit(AnalysisEvent::Completed {
                analysis_type: request.analysis_type,
                key: key.clone(),
                attempts,
                duration: started.elapsed(),
            }),
            Err(err) => self.emit(AnalysisEvent::Failed {
                analysis_type: request.analysis_type,
                key: key.clone(),
                attempts,
                error: err.to_string(),
            }),
        }

        if let Err(err) = self.tracker.publish(&key, outcome.clone()) {
            warn!(error = %err, key = key.short(), "failed to publish analysis outcome");
        }
        outcome
    }

    /// The retry loop for one execution. Returns the terminal outcome and
    /// the number of attempts actually made.
    async fn run_attempts(
        &self,
        step: &Arc<dyn AnalysisStep>,
        request: &AnalysisRequest,
        key: &AnalysisKey,
        plan: &ExecutionPlan,
    ) -> (Result<AnalysisResult, AnalysisError>, u32) {
        let options = AnalysisOptions::new(request.options.clone());
        let mut attempts = 0;
        let mut last_error: Option<StepError> = None;

        while attempts < plan.max_attempts {
            attempts += 1;
            if let Err(err) = self.tracker.record_attempt(key, attempts) {
                warn!(error = %err, key = key.short(), "failed to record attempt");
            }

            let attempt_started = Instant::now();
            let attempt = tokio::time::timeout(
                plan.timeout,
                step.execute(&request.project_path, &options),
            )
            .await;

            let step_error = match attempt {
                Ok(Ok(payload)) => {
                    let result = AnalysisResult {
                        analysis_type: request.analysis_type,
                        project_path: request.project_path.clone(),
                        payload,
                        computed_at: Utc::now(),
                        duration_ms: attempt_started.elapsed().as_millis() as u64,
                    };
                    if let Err(err) = self.cache.put(key.clone(), result.clone(), plan.ttl) {
                        warn!(error = %err, key = key.short(), "failed to cache analysis result");
                    }
                    return (Ok(result), attempts);
                }
                Ok(Err(err)) => err,
                Err(_) => StepError::Timeout {
                    elapsed_ms: plan.timeout.as_millis() as u64,
                },
            };

            warn!(
                analysis_type = %request.analysis_type,
                attempt = attempts,
                max_attempts = plan.max_attempts,
                error = %step_error,
                "analysis attempt failed"
            );
            self.emit(AnalysisEvent::AttemptFailed {
                analysis_type: request.analysis_type,
                attempt: attempts,
                max_attempts: plan.max_attempts,
                error: step_error.to_string(),
            });

            let retryable = step_error.is_retryable();
            last_error = Some(step_error);
            if !retryable {
                break;
            }
            if attempts < plan.max_attempts {
                tokio::time::sleep(plan.retry.delay_for(attempts)).await;
            }
        }

        let error = match last_error {
            Some(StepError::Timeout { .. }) => AnalysisError::Timeout {
                analysis_type: request.analysis_type,
                attempts,
                timeout_ms: plan.timeout.as_millis() as u64,
            },
            Some(err) => AnalysisError::ExecutionFailed {
                analysis_type: request.analysis_type,
                attempts,
                message: err.to_string(),
            },
            None => AnalysisError::Internal {
                message: "analysis finished without a recorded attempt".to_string(),
            },
        };
        (Err(error), attempts)
    }

    fn cache_lookup(&self, key: &AnalysisKey) -> Option<AnalysisResult> {
        match self.cache.get(key) {
            Ok(hit) => hit,
            Err(err) => {
                warn!(error = %err, key = key.short(), "result cache unavailable, treating as miss");
                None
            }
        }
    }

    fn retain_record(&self, record: AnalysisRecord) {
        let mut history = self.history.write().unwrap_or_else(|e| e.into_inner());
        history.insert(record.key.clone(), record);
    }

    fn emit(&self, event: AnalysisEvent) {
        if let Some(handler) = &self.progress {
            handler.on_event(&event);
        }
    }
}

fn flatten_join(
    analysis_type: AnalysisType,
    join_result: Result<Result<AnalysisResult, AnalysisError>, JoinError>,
) -> Result<AnalysisResult, AnalysisError> {
    match join_result {
        Ok(outcome) => outcome,
        Err(err) => Err(AnalysisError::Internal {
            message: format!("analysis task for {} did not complete: {}", analysis_type, err),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingStep {
        analysis_type: AnalysisType,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AnalysisStep for CountingStep {
        fn analysis_type(&self) -> AnalysisType {
            self.analysis_type
        }

        fn description(&self) -> &str {
            "counting stub"
        }

        async fn execute(
            &self,
            _project_path: &Path,
            _options: &AnalysisOptions,
        ) -> Result<Value, StepError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"ok": true}))
        }
    }

    fn orchestrator_with(
        analysis_type: AnalysisType,
    ) -> (AnalysisOrchestrator, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = StepRegistry::new();
        registry
            .register(Arc::new(CountingStep {
                analysis_type,
                calls: Arc::clone(&calls),
            }))
            .unwrap();
        (
            AnalysisOrchestrator::new(OrchestratorConfig::default(), registry),
            calls,
        )
    }

    #[tokio::test]
    async fn test_result_matches_request_type() {
        let (orchestrator, _) = orchestrator_with(AnalysisType::Security);
        let result = orchestrator
            .execute_analysis("/repo", AnalysisType::Security, BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(result.analysis_type, AnalysisType::Security);
        assert_eq!(result.project_path, PathBuf::from("/repo"));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_step() {
        let (orchestrator, calls) = orchestrator_with(AnalysisType::Project);
        for _ in 0..3 {
            orchestrator
                .execute_analysis("/repo", AnalysisType::Project, BTreeMap::new())
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.cached_result_count(), 1);
    }

    #[tokio::test]
    async fn test_bypass_cache_forces_execution() {
        let (orchestrator, calls) = orchestrator_with(AnalysisType::Project);
        let mut options = BTreeMap::new();
        options.insert("bypass_cache".to_string(), json!(true));
        for _ in 0..2 {
            orchestrator
                .execute_analysis("/repo", AnalysisType::Project, options.clone())
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_type_has_zero_side_effects() {
        let (orchestrator, _) = orchestrator_with(AnalysisType::Project);
        let err = orchestrator
            .execute_analysis("/repo", AnalysisType::Security, BTreeMap::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AnalysisError::StepNotFound {
                analysis_type: AnalysisType::Security
            }
        );
        assert_eq!(orchestrator.cached_result_count(), 0);
        assert_eq!(orchestrator.active_execution_count(), 0);

        let key = AnalysisRequest::new("/repo", AnalysisType::Security).key();
        assert!(matches!(
            orchestrator.get_status(&key),
            Err(AnalysisError::RecordNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_status_after_completion() {
        let (orchestrator, _) = orchestrator_with(AnalysisType::Project);
        let request = AnalysisRequest::new("/repo", AnalysisType::Project);
        let key = request.key();
        orchestrator.execute_request(request).await.unwrap();

        let record = orchestrator.get_status(&key).unwrap();
        assert_eq!(record.status, AnalysisStatus::Completed);
        assert_eq!(record.attempt_count, 1);
        assert!(record.error.is_none());
        assert!(record.completed_at.is_some());
    }
}
