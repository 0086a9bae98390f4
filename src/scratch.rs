//! Scratch directory for encoder intermediates.
//!
//! Created on first use and shared by every job of a batch. Each job puts
//! uniquely named files in it, so concurrent jobs never collide.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use crate::error::{IoContext, Result};

#[derive(Debug, Default)]
struct State {
    /// Directory exists and is usable
    ready: bool,
    /// This instance created it and may remove it
    created: bool,
}

/// Lazily created working directory for temporary encoder files.
#[derive(Debug)]
pub struct ScratchDir {
    root: PathBuf,
    state: Mutex<State>,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            state: Mutex::new(State::default()),
        }
    }

    /// `ubitex` under the system temp directory.
    pub fn system_default() -> Self {
        Self::new(std::env::temp_dir().join("ubitex"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if needed and return it.
    pub fn ensure(&self) -> Result<&Path> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.ready {
            if !self.root.is_dir() {
                fs::create_dir_all(&self.root).io_context(|| {
                    format!("Failed to create scratch directory {}", self.root.display())
                })?;
                state.created = true;
                debug!("Created scratch directory {}", self.root.display());
            }
            state.ready = true;
        }
        Ok(&self.root)
    }

    /// Remove the directory if this instance created it and nothing is left
    /// inside. Failures are logged, never returned.
    pub fn release(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.created {
            return;
        }

        let empty = match fs::read_dir(&self.root) {
            Ok(mut entries) => entries.next().is_none(),
            Err(e) => {
                warn!("Cannot inspect scratch directory {}: {}", self.root.display(), e);
                return;
            }
        };

        if !empty {
            debug!(
                "Leaving scratch directory {} in place, it still has files",
                self.root.display()
            );
            return;
        }

        match fs::remove_dir(&self.root) {
            Ok(()) => {
                debug!("Removed scratch directory {}", self.root.display());
                state.created = false;
                state.ready = false;
            }
            Err(e) => warn!(
                "Failed to remove scratch directory {}: {}",
                self.root.display(),
                e
            ),
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        self.release();
    }
}
