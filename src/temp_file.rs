//! Drop guard for the working directory of an in-flight download.
//!
//! A download task owns its working directory through a [`TempDir`]; when
//! the future completes, errors out, or is aborted, the guard drops and the
//! directory goes with it. Nothing survives a terminal outcome.

use std::fs;
use std::path::{Path, PathBuf};

pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    /// Create the directory (and parents) eagerly so the guard always owns
    /// something removable.
    pub fn create(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                log::warn!("failed to remove {:?}: {}", self.path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_dir_removes_contents_on_drop() {
        let dir = std::env::temp_dir().join("tubefetch_test_dir");

        {
            let guard = TempDir::create(&dir).unwrap();
            fs::write(guard.path().join("a.mp4"), b"x").unwrap();
            fs::write(guard.path().join("a.en.srt"), b"y").unwrap();
        }
        assert!(!dir.exists());
    }
}
