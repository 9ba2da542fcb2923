// ── Whole-file writes ──
//
// Every artifact is written to a temp file in the target directory and
// renamed over the destination, so readers see either the old file or
// the new one. A set of files is staged in full before any rename runs;
// a failed write then leaves the previous set in place.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::CoreError;

/// Atomically replace `path` with `contents`, creating parent directories.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), CoreError> {
    StagedWrite::new(path, contents)?.commit().map(drop)
}

/// Contents fully written and synced to a temp file beside `path`, not yet
/// visible at `path`. Dropping it removes the temp file.
#[derive(Debug)]
pub struct StagedWrite {
    path: PathBuf,
    tmp: NamedTempFile,
}

impl StagedWrite {
    pub fn new(path: &Path, contents: &str) -> Result<Self, CoreError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| CoreError::persistence(dir, e))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| CoreError::persistence(path, e))?;
        tmp.write_all(contents.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| CoreError::persistence(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            tmp,
        })
    }

    /// Rename the temp file over the destination.
    pub fn commit(self) -> Result<PathBuf, CoreError> {
        let Self { path, tmp } = self;
        tmp.persist(&path)
            .map_err(|e| CoreError::persistence(&path, e.error))?;
        Ok(path)
    }
}
