//! The pluggable analysis step contract
//!
//! A step is an externally implemented unit of work for one analysis domain.
//! The orchestrator depends only on this trait: it resolves a step from the
//! registry, calls `execute` under an external timeout, and wraps the payload
//! into an [`AnalysisResult`](super::types::AnalysisResult). Steps are
//! required to be idempotent and to read the project only through
//! [`ProjectReader`](crate::fs::ProjectReader).

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use super::error::StepError;
use super::types::AnalysisType;

/// Opaque per-call option map handed to steps. Execution-control keys
/// (timeouts, cache tuning) are consumed by the orchestrator but still
/// visible here; steps should ignore keys they do not recognize.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions(BTreeMap<String, Value>);

impl AnalysisOptions {
    pub fn new(options: BTreeMap<String, Value>) -> Self {
        Self(options)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One pluggable analysis domain.
///
/// The step returns its structured payload; the orchestrator stamps timing
/// and wraps it, so duration is measured uniformly across heterogeneous
/// domains.
#[async_trait]
pub trait AnalysisStep: Send + Sync {
    /// The analysis type this step implements. Used as its registry key.
    fn analysis_type(&self) -> AnalysisType;

    /// Short human-readable description for logs and listings.
    fn description(&self) -> &str;

    /// Run the analysis against `project_path`. Must be idempotent and
    /// read-only with respect to the project.
    async fn execute(
        &self,
        project_path: &Path,
        options: &AnalysisOptions,
    ) -> Result<Value, StepError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_options_typed_accessors() {
        let mut map = BTreeMap::new();
        map.insert("timeout_ms".to_string(), json!(250));
        map.insert("bypass_cache".to_string(), json!(true));
        map.insert("profile".to_string(), json!("strict"));
        let options = AnalysisOptions::new(map);

        assert_eq!(options.get_u64("timeout_ms"), Some(250));
        assert_eq!(options.get_bool("bypass_cache"), Some(true));
        assert_eq!(options.get_str("profile"), Some("strict"));
        assert_eq!(options.get_u64("profile"), None);
        assert!(options.get("missing").is_none());
    }

    #[test]
    fn test_options_default_is_empty() {
        assert!(AnalysisOptions::default().is_empty());
    }
}
