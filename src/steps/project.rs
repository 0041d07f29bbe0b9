use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::analysis::error::StepError;
use crate::analysis::step::{AnalysisOptions, AnalysisStep};
use crate::analysis::types::AnalysisType;
use crate::fs::{ProjectReader, WalkConfig};

use super::ensure_project;

/// Maps the shape of the project tree: file and directory counts, top-level
/// layout, and the extension histogram.
pub struct ProjectStructureStep {
    reader: Arc<dyn ProjectReader>,
    walk: WalkConfig,
}

impl ProjectStructureStep {
    pub fn new(reader: Arc<dyn ProjectReader>) -> Self {
        Self {
            reader,
            walk: WalkConfig::default(),
        }
    }
}

#[async_trait]
impl AnalysisStep for ProjectStructureStep {
    fn analysis_type(&self) -> AnalysisType {
        AnalysisType::Project
    }

    fn description(&self) -> &str {
        "project tree shape and layout"
    }

    async fn execute(
        &self,
        project_path: &Path,
        _options: &AnalysisOptions,
    ) -> Result<Value, StepError> {
        ensure_project(self.reader.as_ref(), project_path)?;
        let entries = self.reader.walk(project_path, &self.walk)?;

        let mut directories = std::collections::BTreeSet::new();
        let mut by_extension: BTreeMap<String, usize> = BTreeMap::new();
        let mut top_level: BTreeMap<String, usize> = BTreeMap::new();
        let mut total_bytes = 0u64;
        let mut max_depth = 0usize;

        for entry in &entries {
            total_bytes += entry.size;
            max_depth = max_depth.max(entry.depth);
            for ancestor in entry.path.ancestors().skip(1) {
                if !ancestor.as_os_str().is_empty() {
                    directories.insert(ancestor.to_path_buf());
                }
            }
            if let Some(ext) = entry.extension() {
                *by_extension.entry(ext.to_string()).or_default() += 1;
            }
            let bucket = match entry.path.components().next() {
                Some(first) if entry.depth > 1 => {
                    first.as_os_str().to_string_lossy().into_owned()
                }
                _ => ".".to_string(),
            };
            *top_level.entry(bucket).or_default() += 1;
        }

        Ok(json!({
            "total_files": entries.len(),
            "total_directories": directories.len(),
            "total_bytes": total_bytes,
            "max_depth": max_depth,
            "top_level": top_level,
            "by_extension": by_extension,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockProjectReader;

    fn step() -> ProjectStructureStep {
        let reader = MockProjectReader::new()
            .with_file("/repo/Cargo.toml", "[package]")
            .with_file("/repo/src/main.rs", "fn main() {}")
            .with_file("/repo/src/util/mod.rs", "pub fn noop() {}")
            .with_file("/repo/docs/guide.md", "# Guide");
        ProjectStructureStep::new(Arc::new(reader))
    }

    #[tokio::test]
    async fn test_counts_files_and_directories() {
        let payload = step()
            .execute(Path::new("/repo"), &AnalysisOptions::default())
            .await
            .unwrap();

        assert_eq!(payload["total_files"], 4);
        // src, src/util, docs
        assert_eq!(payload["total_directories"], 3);
        assert_eq!(payload["by_extension"]["rs"], 2);
        assert_eq!(payload["top_level"]["src"], 2);
        assert_eq!(payload["top_level"]["."], 1);
        assert_eq!(payload["max_depth"], 3);
    }

    #[tokio::test]
    async fn test_missing_project_is_invalid_input() {
        let err = step()
            .execute(Path::new("/missing"), &AnalysisOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::InvalidInput { .. }));
    }
}
