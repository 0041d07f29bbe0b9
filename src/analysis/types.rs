use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::error::AnalysisError;

/// Option keys that tune a single call (budget, cache behavior) rather than
/// describing what is analyzed. They are excluded from key normalization so
/// callers differing only in tuning still dedupe and cache together.
pub const EXECUTION_OPTION_KEYS: [&str; 4] =
    ["timeout_ms", "ttl_ms", "max_attempts", "bypass_cache"];

/// The closed set of analysis domains the orchestrator can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisType {
    Project,
    CodeQuality,
    Security,
    Performance,
    Architecture,
    TechStack,
}

impl AnalysisType {
    /// All types, in comprehensive fan-out order.
    pub fn all() -> [AnalysisType; 6] {
        [
            AnalysisType::Project,
            AnalysisType::CodeQuality,
            AnalysisType::Security,
            AnalysisType::Performance,
            AnalysisType::Architecture,
            AnalysisType::TechStack,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Project => "project",
            AnalysisType::CodeQuality => "code-quality",
            AnalysisType::Security => "security",
            AnalysisType::Performance => "performance",
            AnalysisType::Architecture => "architecture",
            AnalysisType::TechStack => "tech-stack",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unrecognized analysis type name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown analysis type: {0}")]
pub struct UnknownAnalysisType(pub String);

impl FromStr for AnalysisType {
    type Err = UnknownAnalysisType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnalysisType::all()
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownAnalysisType(s.to_string()))
    }
}

/// Deterministic identity of one analysis: SHA-256 over the project path,
/// the analysis type, and the normalized option map.
///
/// Used as the cache key and the single-flight deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalysisKey(String);

impl AnalysisKey {
    pub fn compute(
        project_path: &std::path::Path,
        analysis_type: AnalysisType,
        options: &BTreeMap<String, serde_json::Value>,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(project_path.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(analysis_type.as_str().as_bytes());
        // BTreeMap iteration is sorted, so the digest is order-independent.
        for (key, value) in options {
            if EXECUTION_OPTION_KEYS.contains(&key.as_str()) {
                continue;
            }
            hasher.update([0u8]);
            hasher.update(key.as_bytes());
            hasher.update([1u8]);
            hasher.update(value.to_string().as_bytes());
        }
        AnalysisKey(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Truncated form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for AnalysisKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One caller-initiated analysis request. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub project_path: PathBuf,
    pub analysis_type: AnalysisType,
    pub options: BTreeMap<String, serde_json::Value>,
    pub request_id: Uuid,
}

impl AnalysisRequest {
    pub fn new(project_path: impl Into<PathBuf>, analysis_type: AnalysisType) -> Self {
        Self {
            project_path: project_path.into(),
            analysis_type,
            options: BTreeMap::new(),
            request_id: Uuid::new_v4(),
        }
    }

    pub fn with_options(mut self, options: BTreeMap<String, serde_json::Value>) -> Self {
        self.options = options;
        self
    }

    pub fn with_option(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> AnalysisKey {
        AnalysisKey::compute(&self.project_path, self.analysis_type, &self.options)
    }
}

/// Output of one completed analysis. Read-only once produced; cloned freely
/// between the cache and single-flight subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analysis_type: AnalysisType,
    pub project_path: PathBuf,
    pub payload: serde_json::Value,
    pub computed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Lifecycle of an analysis record. Transitions are strictly
/// Pending -> Running -> (Completed | Failed); a failed key runs again only
/// through an explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Failed)
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Running => "running",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Bookkeeping for one key's execution. Created on the first request for a
/// key and mutated only by the orchestrator; the active copy lives in the
/// tracker while a run is in flight, and the most recent record per key is
/// retained afterwards so status polling and explicit retries keep working.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub key: AnalysisKey,
    pub request: AnalysisRequest,
    pub status: AnalysisStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    /// Summary of the final error, if the run failed.
    pub error: Option<String>,
    /// Callers currently awaiting this key's outcome.
    pub subscribers: usize,
}

impl AnalysisRecord {
    pub fn new(key: AnalysisKey, request: AnalysisRequest) -> Self {
        Self {
            key,
            request,
            status: AnalysisStatus::Pending,
            started_at: None,
            completed_at: None,
            attempt_count: 0,
            error: None,
            subscribers: 0,
        }
    }
}

/// Aggregate of one comprehensive fan-out call. Transient; this core does
/// not persist it.
#[derive(Debug)]
pub struct ComprehensiveReport {
    pub project_path: PathBuf,
    pub per_type: HashMap<AnalysisType, Result<AnalysisResult, AnalysisError>>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ComprehensiveReport {
    pub fn result(&self, analysis_type: AnalysisType) -> Option<&Result<AnalysisResult, AnalysisError>> {
        self.per_type.get(&analysis_type)
    }

    pub fn succeeded(&self) -> Vec<&AnalysisResult> {
        self.per_type.values().filter_map(|r| r.as_ref().ok()).collect()
    }

    pub fn failed(&self) -> Vec<(AnalysisType, &AnalysisError)> {
        self.per_type
            .iter()
            .filter_map(|(t, r)| r.as_ref().err().map(|e| (*t, e)))
            .collect()
    }

    pub fn is_complete_success(&self) -> bool {
        !self.per_type.is_empty() && self.per_type.values().all(|r| r.is_ok())
    }
}
