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

use super::ensure_project;

const MAX_READ_BYTES: u64 = 256 * 1024;
const MAX_FINDINGS: usize = 100;

/// Flags likely credential material committed into the tree. Pattern-based
/// and intentionally conservative; a dedicated scanner step can replace it.
pub struct SecurityStep {
    reader: Arc<dyn ProjectReader>,
    walk: WalkConfig,
}

impl SecurityStep {
    pub fn new(reader: Arc<dyn ProjectReader>) -> Self {
        Self {
            reader,
            // Dotfiles are where committed credentials usually hide.
            walk: WalkConfig {
                include_hidden: true,
                ..WalkConfig::default()
            },
        }
    }

    fn rules() -> Result<Vec<(&'static str, Regex)>, StepError> {
        let patterns = [
            (
                "hardcoded-credential",
                r#"(?i)\b(password|passwd|secret|api[_-]?key|auth[_-]?token)\b\s*[:=]\s*["'][^"']{4,}["']"#,
            ),
            (
                "private-key",
                r"-----BEGIN (?:RSA |EC |DSA |OPENSSH )?PRIVATE KEY-----",
            ),
            ("aws-access-key", r"\bAKIA[0-9A-Z]{16}\b"),
            (
                "credential-in-url",
                r"(?i)\b[a-z][a-z0-9+.-]*://[^/\s:@]+:[^/\s:@]+@",
            ),
        ];
        patterns
            .into_iter()
            .map(|(label, pattern)| {
                Regex::new(pattern)
                    .map(|regex| (label, regex))
                    .map_err(|e| StepError::execution(format!("invalid rule {label}: {e}")))
            })
            .collect()
    }
}

#[async_trait]
impl AnalysisStep for SecurityStep {
    fn analysis_type(&self) -> AnalysisType {
        AnalysisType::Security
    }

    fn description(&self) -> &str {
        "committed credential scan"
    }

    async fn execute(
        &self,
        project_path: &Path,
        _options: &AnalysisOptions,
    ) -> Result<Value, StepError> {
        ensure_project(self.reader.as_ref(), project_path)?;
        let entries = self.reader.walk(project_path, &self.walk)?;
        let rules = Self::rules()?;

        let mut findings = Vec::new();
        let mut files_scanned = 0usize;
        let mut truncated = false;

        'files: for entry in &entries {
            if entry.size > MAX_READ_BYTES {
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

            for (line_number, line) in content.lines().enumerate() {
                for (rule, regex) in &rules {
                    if regex.is_match(line) {
                        findings.push(json!({
                            "file": entry.path.display().to_string(),
                            "line": line_number + 1,
                            "rule": rule,
                        }));
                        if findings.len() >= MAX_FINDINGS {
                            truncated = true;
                            break 'files;
                        }
                    }
                }
            }
        }

        Ok(json!({
            "files_scanned": files_scanned,
            "total_findings": findings.len(),
            "truncated": truncated,
            "findings": findings,
        }))
    }
}
