use super::{FileEntry, ProjectReader, WalkConfig};
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// In-memory `ProjectReader` for tests. Directories are implied by the file
/// paths stored in it.
#[derive(Debug, Default, Clone)]
pub struct MockProjectReader {
    files: BTreeMap<PathBuf, String>,
}

impl MockProjectReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

impl ProjectReader for MockProjectReader {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.is_dir(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.files.keys().any(|p| p.starts_with(path) && p != path)
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("no such file: {}", path.display()))
    }

    fn file_size(&self, path: &Path) -> Result<u64> {
        self.files
            .get(path)
            .map(|c| c.len() as u64)
            .ok_or_else(|| anyhow!("no such file: {}", path.display()))
    }

    fn walk(&self, root: &Path, config: &WalkConfig) -> Result<Vec<FileEntry>> {
        let mut entries = Vec::new();
        for (path, content) in &self.files {
            let relative = match path.strip_prefix(root) {
                Ok(r) => r,
                Err(_) => continue,
            };
            let depth = relative.components().count();
            if depth > config.max_depth {
                continue;
            }
            if !config.include_hidden
                && relative
                    .components()
                    .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
            {
                continue;
            }
            entries.push(FileEntry {
                path: relative.to_path_buf(),
                size: content.len() as u64,
                depth,
            });
            if entries.len() >= config.max_files {
                break;
            }
        }
        Ok(entries)
    }
}
