use super::{FileEntry, ProjectReader, WalkConfig};
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::path::Path;
use tracing::warn;

/// `ProjectReader` backed by the real filesystem. Walks are gitignore-aware
/// and skip hidden entries unless asked otherwise.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalProjectReader;

impl LocalProjectReader {
    pub fn new() -> Self {
        Self
    }
}

impl ProjectReader for LocalProjectReader {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("failed to stat {}", path.display()))?;
        Ok(metadata.len())
    }

    fn walk(&self, root: &Path, config: &WalkConfig) -> Result<Vec<FileEntry>> {
        let mut entries = Vec::new();

        for result in WalkBuilder::new(root)
            .max_depth(Some(config.max_depth))
            .hidden(!config.include_hidden)
            .git_ignore(true)
            .build()
        {
            let entry = match result {
                Ok(e) => e,
                Err(err) => {
                    warn!(error = %err, "failed to read directory entry");
                    continue;
                }
            };

            if !entry.path().is_file() {
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_path_buf();

            entries.push(FileEntry {
                path: relative,
                size,
                depth: entry.depth(),
            });

            if entries.len() >= config.max_files {
                warn!(
                    max_files = config.max_files,
                    root = %root.display(),
                    "walk truncated at file limit"
                );
                break;
            }
        }

        Ok(entries)
    }
}
