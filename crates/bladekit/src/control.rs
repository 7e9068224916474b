//! Control marker for detecting an unclean shutdown
//!
//! A session creates the marker when it starts and deletes it when it stops.
//! Finding the marker at startup means the previous session never reached
//! its shutdown path.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BladeError, Result};

/// Presence flag that outlives the process
pub trait ControlMarker: Send + Sync {
    fn exists(&self) -> bool;

    fn create(&self) -> Result<()>;

    /// Remove the marker. Removing an absent marker succeeds.
    fn delete(&self) -> Result<()>;

    /// Where the marker lives, for error reporting
    fn location(&self) -> PathBuf;
}

/// A marker file holding the pid of the session that created it
#[derive(Debug, Clone)]
pub struct FileMarker {
    path: PathBuf,
}

impl FileMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> BladeError {
        BladeError::Marker {
            path: self.path.clone(),
            source,
        }
    }
}

impl ControlMarker for FileMarker {
    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn create(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        fs::write(&self.path, format!("{}\n", std::process::id())).map_err(|e| self.io_error(e))?;
        tracing::debug!("Created control marker {}", self.path.display());
        Ok(())
    }

    fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!("Deleted control marker {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn location(&self) -> PathBuf {
        self.path.clone()
    }
}
