use std::io;
use std::path::PathBuf;

use crate::{OfflineCommand, OfflineStage};

/// A stage was invoked when its entry conditions do not hold.
///
/// These are operator-facing, never retried automatically, and map to exit
/// code 1 at the CLI boundary.
#[derive(Debug, thiserror::Error)]
pub enum PreconditionError {
    #[error("need a target releasever different from the current system version (both are \"{0}\")")]
    SameReleasever(String),

    #[error("the system-upgrade transaction is empty; the system is already up-to-date")]
    NothingToDo,

    #[error("`{command}` cannot be used while the offline upgrade is in the \"{stage}\" stage")]
    WrongStage {
        command: OfflineCommand,
        stage: OfflineStage,
    },
}

/// Filesystem failure while reading, replacing or removing persisted state.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to replace {}: {source}", path.display())]
    Replace { path: PathBuf, source: io::Error },

    #[error("failed to remove {}: {source}", path.display())]
    Remove { path: PathBuf, source: io::Error },

    #[error("failed to parse {}: {detail}", path.display())]
    Corrupt { path: PathBuf, detail: String },
}
