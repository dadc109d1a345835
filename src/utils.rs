//! Utility functions shared by the master, the workers and the
//! sequential runner.
//!

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use glob::glob;

/// Where a job's intermediate and result files live.
///
/// Every name is a pure function of its arguments, so a map task on one
/// worker and a reduce task on another agree on the same path as long as
/// they share `dir`.
#[derive(Debug, Clone)]
pub struct PartitionLayout {
    dir: PathBuf,
}

impl PartitionLayout {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The partition map task `map_task` writes for reduce task `reduce_task`.
    pub fn partition(&self, job_name: &str, map_task: u32, reduce_task: u32) -> PathBuf {
        self.dir
            .join(format!("mrtmp.{job_name}-{map_task}-{reduce_task}"))
    }

    /// The output of reduce task `reduce_task`.
    pub fn result(&self, job_name: &str, reduce_task: u32) -> PathBuf {
        self.dir.join(format!("mrtmp.{job_name}-res-{reduce_task}"))
    }

    /// The job's final merged output.
    pub fn merged(&self, job_name: &str) -> PathBuf {
        self.dir.join(format!("mrtmp.{job_name}"))
    }
}

/// Expands a glob spec into the sorted list of map input files.
pub fn expand_inputs(pattern: &str) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in glob(pattern)? {
        let path = entry?;
        if path.is_file() {
            files.push(path.to_string_lossy().into_owned());
        }
    }
    if files.is_empty() {
        bail!("no input files match `{pattern}`");
    }
    files.sort();
    Ok(files)
}

/// A sibling of `path` to stage a write in before renaming it into place.
pub(crate) fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".tmp-{}", uuid::Uuid::new_v4()));
    path.with_file_name(name)
}
