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

/// Files at or above this size get listed individually.
const LARGE_FILE_BYTES: u64 = 1024 * 1024;
/// Directories holding more files than this are flagged as crowded.
const CROWDED_DIR_FILES: usize = 200;
const MAX_LISTED: usize = 20;

/// Size and layout signals that tend to dominate build and scan times:
/// oversized files, crowded directories, deep nesting.
pub struct PerformanceStep {
    reader: Arc<dyn ProjectReader>,
    walk: WalkConfig,
}

impl PerformanceStep {
    pub fn new(reader: Arc<dyn ProjectReader>) -> Self {
        Self {
            reader,
            walk: WalkConfig::default(),
        }
    }
}

#[async_trait]
impl AnalysisStep for PerformanceStep {
    fn analysis_type(&self) -> AnalysisType {
        AnalysisType::Performance
    }

    fn description(&self) -> &str {
        "size and nesting hotspots"
    }

    async fn execute(
        &self,
        project_path: &Path,
        _options: &AnalysisOptions,
    ) -> Result<Value, StepError> {
        ensure_project(self.reader.as_ref(), project_path)?;
        let entries = self.reader.walk(project_path, &self.walk)?;

        let mut total_bytes = 0u64;
        let mut max_depth = 0usize;
        let mut per_directory: BTreeMap<String, usize> = BTreeMap::new();
        let mut large_files: Vec<(String, u64)> = Vec::new();

        for entry in &entries {
            total_bytes += entry.size;
            max_depth = max_depth.max(entry.depth);

            let parent = entry
                .path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ".".to_string());
            *per_directory.entry(parent).or_default() += 1;

            if entry.size >= LARGE_FILE_BYTES {
                large_files.push((entry.path.display().to_string(), entry.size));
            }
        }

        large_files.sort_by(|a, b| b.1.cmp(&a.1));
        large_files.truncate(MAX_LISTED);

        let mut crowded: Vec<(&String, &usize)> = per_directory
            .iter()
            .filter(|(_, count)| **count > CROWDED_DIR_FILES)
            .collect();
        crowded.sort_by(|a, b| b.1.cmp(a.1));
        crowded.truncate(MAX_LISTED);

        Ok(json!({
            "files_scanned": entries.len(),
            "total_bytes": total_bytes,
            "max_depth": max_depth,
            "large_files": large_files
                .iter()
                .map(|(file, size)| json!({"file": file, "bytes": size}))
                .collect::<Vec<_>>(),
            "crowded_directories": crowded
                .iter()
                .map(|(dir, count)| json!({"directory": dir, "files": count}))
                .collect::<Vec<_>>(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockProjectReader;

    #[tokio::test]
    async fn test_flags_large_files() {
        let blob = "x".repeat(LARGE_FILE_BYTES as usize + 1);
        let reader = MockProjectReader::new()
            .with_file("/repo/assets/dump.bin", blob)
            .with_file("/repo/src/main.rs", "fn main() {}\n");
        let step = PerformanceStep::new(Arc::new(reader));

        let payload = step
            .execute(Path::new("/repo"), &AnalysisOptions::default())
            .await
            .unwrap();

        assert_eq!(payload["files_scanned"], 2);
        let large = payload["large_files"].as_array().unwrap();
        assert_eq!(large.len(), 1);
        assert_eq!(large[0]["file"], "assets/dump.bin");
        assert!(payload["total_bytes"].as_u64().unwrap() > LARGE_FILE_BYTES);
    }

    #[tokio::test]
    async fn test_small_tree_has_no_hotspots() {
        let reader = MockProjectReader::new().with_file("/repo/src/main.rs", "fn main() {}\n");
        let step = PerformanceStep::new(Arc::new(reader));

        let payload = step
            .execute(Path::new("/repo"), &AnalysisOptions::default())
            .await
            .unwrap();

        assert!(payload["large_files"].as_array().unwrap().is_empty());
        assert!(payload["crowded_directories"].as_array().unwrap().is_empty());
        assert_eq!(payload["max_depth"], 2);
    }
}
