//! Staged writes that become visible only when complete.

use poolwarm_core::{Error, Result};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::debug;

/// A temporary sibling of the target path. Dropping it without calling
/// [`StagedPath::publish`] removes the temporary file and leaves the
/// target untouched.
#[derive(Debug)]
pub struct StagedPath {
    target: PathBuf,
    temp: TempPath,
}

impl StagedPath {
    /// Reserve a temporary file next to `target`, creating the parent
    /// directory if needed.
    pub async fn create(target: &Path) -> Result<Self> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&dir).await?;

        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(".tmp")
            .tempfile_in(&dir)?
            .into_temp_path();

        debug!(staged = %temp.display(), target = %target.display(), "Staging image write");
        Ok(Self {
            target: target.to_path_buf(),
            temp,
        })
    }

    /// Where the data is being written.
    pub fn path(&self) -> &Path {
        &self.temp
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Atomically move the staged file over the target.
    pub fn publish(self) -> Result<PathBuf> {
        let target = self.target;
        self.temp
            .persist(&target)
            .map_err(|e| Error::Io(e.error))?;
        Ok(target)
    }
}
