//! Read-only filesystem access for analysis steps
//!
//! Steps never touch `std::fs` directly; they go through [`ProjectReader`]
//! so the orchestrator core stays filesystem-free and steps can be tested
//! against in-memory trees.

mod local;
mod mock;

pub use local::LocalProjectReader;
pub use mock::MockProjectReader;

use anyhow::Result;
use std::path::{Path, PathBuf};

/// One file discovered by a project walk. `path` is relative to the walk
/// root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size: u64,
    pub depth: usize,
}

impl FileEntry {
    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|e| e.to_str())
    }

    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Limits applied to a project walk.
#[derive(Debug, Clone)]
pub struct WalkConfig {
    pub max_depth: usize,
    pub max_files: usize,
    pub include_hidden: bool,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_files: 10_000,
            include_hidden: false,
        }
    }
}

/// Read-only view of a source project.
pub trait ProjectReader: Send + Sync {
    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Check if path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Read file contents as string
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Size of a file in bytes
    fn file_size(&self, path: &Path) -> Result<u64>;

    /// List files under `root`, honoring the walk limits. Entries carry
    /// root-relative paths.
    fn walk(&self, root: &Path, config: &WalkConfig) -> Result<Vec<FileEntry>>;
}
