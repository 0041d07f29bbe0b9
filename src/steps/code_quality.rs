use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::analysis::error::StepError;
use crate::analysis::step::{AnalysisOptions, AnalysisStep};
use crate::analysis::types::AnalysisType;
use crate::fs::{ProjectReader, WalkConfig};

use super::{ensure_project, is_source_file};

/// Files above this size are counted but not read line by line.
const MAX_READ_BYTES: u64 = 256 * 1024;
/// A source file longer than this is flagged as oversized.
const LONG_FILE_LINES: usize = 400;
const MAX_FLAGGED_FILES: usize = 20;

/// Surface-level source metrics: line counts, oversized files, and leftover
/// marker comments.
pub struct CodeQualityStep {
    reader: Arc<dyn ProjectReader>,
    walk: WalkConfig,
}

impl CodeQualityStep {
    pub fn new(reader: Arc<dyn ProjectReader>) -> Self {
        Self {
            reader,
            walk: WalkConfig::default(),
        }
    }
}

#[async_trait]
impl AnalysisStep for CodeQualityStep {
    fn analysis_type(&self) -> AnalysisType {
        AnalysisType::CodeQuality
    }

    fn description(&self) -> &str {
        "source line metrics and marker comments"
    }

    async fn execute(
        &self,
        project_path: &Path,
        options: &AnalysisOptions,
    ) -> Result<Value, StepError> {
        ensure_project(self.reader.as_ref(), project_path)?;
        let entries = self.reader.walk(project_path, &self.walk)?;

        let long_file_lines = options
            .get_u64("long_file_lines")
            .map(|n| n as usize)
            .unwrap_or(LONG_FILE_LINES);
        let marker = Regex::new(r"(?i)\b(todo|fixme|hack)\b")
            .map_err(|e| StepError::execution(format!("invalid marker pattern: {e}")))?;

        let mut files_scanned = 0usize;
        let mut total_lines = 0usize;
        let mut blank_lines = 0usize;
        let mut marker_count = 0usize;
        let mut long_files = Vec::new();

        for entry in entries.iter().filter(|e| is_source_file(e)) {
            if entry.size > MAX_READ_BYTES {
                debug!(file = %entry.path.display(), size = entry.size, "skipping oversized file");
                continue;
            }
            let content = match self.reader.read_to_string(&project_path.join(&entry.path)) {
                Ok(content) => content,
                Err(err) => {
                    debug!(file = %entry.path.display(), error = %err, "skipping unreadable file");
                    continue;
                }
            };

            files_scanned += 1;
            let mut lines = 0usize;
            for line in content.lines() {
                lines += 1;
                if line.trim().is_empty() {
                    blank_lines += 1;
                }
                marker_count += marker.find_iter(line).count();
            }
            total_lines += lines;

            if lines > long_file_lines && long_files.len() < MAX_FLAGGED_FILES {
                long_files.push(json!({
                    "file": entry.path.display().to_string(),
                    "lines": lines,
                }));
            }
        }

        let average_file_lines = if files_scanned > 0 {
            total_lines / files_scanned
        } else {
            0
        };

        Ok(json!({
            "files_scanned": files_scanned,
            "total_lines": total_lines,
            "blank_lines": blank_lines,
            "average_file_lines": average_file_lines,
            "long_files": long_files,
            "marker_comments": marker_count,
        }))
    }
}
