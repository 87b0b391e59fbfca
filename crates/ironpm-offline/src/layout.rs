use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Paths inside the offline state directory.
///
/// The directory holds everything that must survive the reboot: the captured
/// transaction document, the downloaded package cache and the offline state
/// record with its status log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join("offline-state.json")
    }

    pub fn transaction_path(&self) -> PathBuf {
        self.root.join("transaction.json")
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.root.join("packages")
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [self.root.clone(), self.packages_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}
