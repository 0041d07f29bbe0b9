//! Reference analysis steps
//!
//! Six structural implementations of [`AnalysisStep`], one per analysis
//! domain. Their heuristics are deliberately lightweight — real deployments
//! swap in their own steps — but each one does honest work against the
//! project tree so the orchestrator is exercisable end to end. All project
//! access goes through [`ProjectReader`]; steps are idempotent and
//! read-only.

mod architecture;
mod code_quality;
mod performance;
mod project;
mod security;
mod tech_stack;

pub use architecture::ArchitectureStep;
pub use code_quality::CodeQualityStep;
pub use performance::PerformanceStep;
pub use project::ProjectStructureStep;
pub use security::SecurityStep;
pub use tech_stack::TechStackStep;

use std::path::Path;
use std::sync::Arc;

use crate::analysis::error::StepError;
use crate::analysis::step::AnalysisStep;
use crate::fs::{FileEntry, ProjectReader};

/// One instance of each reference step, all sharing `reader`.
pub fn default_steps(reader: Arc<dyn ProjectReader>) -> Vec<Arc<dyn AnalysisStep>> {
    vec![
        Arc::new(ProjectStructureStep::new(Arc::clone(&reader))),
        Arc::new(CodeQualityStep::new(Arc::clone(&reader))),
        Arc::new(SecurityStep::new(Arc::clone(&reader))),
        Arc::new(PerformanceStep::new(Arc::clone(&reader))),
        Arc::new(ArchitectureStep::new(Arc::clone(&reader))),
        Arc::new(TechStackStep::new(reader)),
    ]
}

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "js", "jsx", "ts", "tsx", "py", "go", "java", "kt", "rb", "php", "ex", "exs", "c",
    "cc", "cpp", "h", "hpp", "cs", "swift", "scala",
];

pub(crate) fn is_source_file(entry: &FileEntry) -> bool {
    entry
        .extension()
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Rejects requests against paths that are not readable project roots.
pub(crate) fn ensure_project(reader: &dyn ProjectReader, path: &Path) -> Result<(), StepError> {
    if !reader.exists(path) {
        return Err(StepError::invalid_input(format!(
            "project path not found: {}",
            path.display()
        )));
    }
    if !reader.is_dir(path) {
        return Err(StepError::invalid_input(format!(
            "project path is not a directory: {}",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockProjectReader;
    use std::path::PathBuf;

    #[test]
    fn test_default_steps_cover_distinct_types() {
        let steps = default_steps(Arc::new(MockProjectReader::new()));
        let mut types: Vec<_> = steps.iter().map(|s| s.analysis_type()).collect();
        types.sort();
        types.dedup();
        assert_eq!(types.len(), 6);
    }

    #[test]
    fn test_is_source_file() {
        let source = FileEntry {
            path: PathBuf::from("src/main.rs"),
            size: 10,
            depth: 2,
        };
        let asset = FileEntry {
            path: PathBuf::from("logo.png"),
            size: 10,
            depth: 1,
        };
        assert!(is_source_file(&source));
        assert!(!is_source_file(&asset));
    }

    #[test]
    fn test_ensure_project_rejects_missing_path() {
        let reader = MockProjectReader::new().with_file("/repo/a.rs", "");
        assert!(ensure_project(&reader, Path::new("/repo")).is_ok());
        let err = ensure_project(&reader, Path::new("/missing")).unwrap_err();
        assert!(!err.is_retryable());
    }
}
