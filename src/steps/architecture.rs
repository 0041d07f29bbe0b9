use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use crate::analysis::error::StepError;
use crate::analysis::step::{AnalysisOptions, AnalysisStep};
use crate::analysis::types::AnalysisType;
use crate::fs::{ProjectReader, WalkConfig};

use super::ensure_project;

const ENTRY_POINT_NAMES: &[&str] = &[
    "main.rs", "lib.rs", "index.js", "index.ts", "main.py", "app.py", "main.go", "Main.java",
    "Program.cs", "application.rb",
];

/// Reads the macro structure of the project: top-level layout roles, entry
/// points, and the module fan-out under the source root.
pub struct ArchitectureStep {
    reader: Arc<dyn ProjectReader>,
    walk: WalkConfig,
}

impl ArchitectureStep {
    pub fn new(reader: Arc<dyn ProjectReader>) -> Self {
        Self {
            reader,
            walk: WalkConfig::default(),
        }
    }

    fn layout_role(directory: &str) -> Option<&'static str> {
        match directory {
            "src" | "lib" | "app" => Some("sources"),
            "test" | "tests" | "spec" => Some("tests"),
            "doc" | "docs" => Some("documentation"),
            "bench" | "benches" => Some("benchmarks"),
            "scripts" | "tools" | "bin" => Some("tooling"),
            _ => None,
        }
    }
}

#[async_trait]
impl AnalysisStep for ArchitectureStep {
    fn analysis_type(&self) -> AnalysisType {
        AnalysisType::Architecture
    }

    fn description(&self) -> &str {
        "layout roles, entry points, module fan-out"
    }

    async fn execute(
        &self,
        project_path: &Path,
        _options: &AnalysisOptions,
    ) -> Result<Value, StepError> {
        ensure_project(self.reader.as_ref(), project_path)?;
        let entries = self.reader.walk(project_path, &self.walk)?;

        let mut top_level_dirs = BTreeSet::new();
        let mut entry_points = Vec::new();
        let mut source_modules = BTreeSet::new();

        for entry in &entries {
            let mut components = entry.path.components().map(|c| c.as_os_str().to_string_lossy());
            let first = match components.next() {
                Some(first) => first.into_owned(),
                None => continue,
            };
            let second = components.next();

            if entry.depth > 1 {
                top_level_dirs.insert(first.clone());
            }
            if let Some(name) = entry.file_name() {
                if ENTRY_POINT_NAMES.contains(&name) {
                    entry_points.push(entry.path.display().to_string());
                }
            }
            // Directories directly under the source root count as modules.
            if first == "src" || first == "lib" {
                if let Some(second) = second {
                    if entry.depth > 2 {
                        source_modules.insert(second.into_owned());
                    }
                }
            }
        }

        let mut layout: BTreeMap<&str, Vec<&String>> = BTreeMap::new();
        for dir in &top_level_dirs {
            if let Some(role) = Self::layout_role(dir) {
                layout.entry(role).or_default().push(dir);
            }
        }

        entry_points.sort();

        Ok(json!({
            "top_level_dirs": top_level_dirs,
            "layout": layout,
            "entry_points": entry_points,
            "source_modules": source_modules,
        }))
    }
}
