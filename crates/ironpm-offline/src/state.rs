use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::{StateLayout, StoreError};

/// Where the offline upgrade currently stands. Persisted between process
/// invocations and across the reboot boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OfflineStage {
    #[default]
    None,
    DownloadIncomplete,
    DownloadFinished,
    RebootRequested,
    UpgradeInProgress,
    UpgradeFinished,
    Cleaned,
}

impl OfflineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::DownloadIncomplete => "download-incomplete",
            Self::DownloadFinished => "download-finished",
            Self::RebootRequested => "reboot-requested",
            Self::UpgradeInProgress => "upgrade-in-progress",
            Self::UpgradeFinished => "upgrade-finished",
            Self::Cleaned => "cleaned",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "none" => Ok(Self::None),
            "download-incomplete" => Ok(Self::DownloadIncomplete),
            "download-finished" => Ok(Self::DownloadFinished),
            "reboot-requested" => Ok(Self::RebootRequested),
            "upgrade-in-progress" => Ok(Self::UpgradeInProgress),
            "upgrade-finished" => Ok(Self::UpgradeFinished),
            "cleaned" => Ok(Self::Cleaned),
            _ => Err(anyhow!("invalid offline stage: {value}")),
        }
    }
}

impl std::fmt::Display for OfflineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Persistence goes through the same token mapping as everything else, so an
// unrecognized stage in the state file surfaces as a corrupt store instead
// of being silently defaulted.
impl Serialize for OfflineStage {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OfflineStage {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        OfflineStage::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// One status record appended at a stage transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub stage_id: String,
    pub message: String,
    pub system_releasever: String,
    pub target_releasever: String,
    pub recorded_at_unix: u64,
}

/// The persisted offline upgrade record.
///
/// Created on first download, mutated at every stage transition, removed by
/// clean. The status log is append-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineState {
    pub stage: OfflineStage,
    #[serde(default)]
    pub system_releasever: String,
    #[serde(default)]
    pub target_releasever: String,
    #[serde(default)]
    pub poweroff_after: bool,
    #[serde(default)]
    pub status_log: Vec<StatusEntry>,
}

impl OfflineState {
    /// Appends a status record and mirrors it to the host event log.
    pub fn log_status(&mut self, stage_id: &str, message: &str, recorded_at_unix: u64) {
        tracing::info!(
            stage_id,
            system_releasever = %self.system_releasever,
            target_releasever = %self.target_releasever,
            "{message}"
        );
        self.status_log.push(StatusEntry {
            stage_id: stage_id.to_string(),
            message: message.to_string(),
            system_releasever: self.system_releasever.clone(),
            target_releasever: self.target_releasever.clone(),
            recorded_at_unix,
        });
    }
}

pub(crate) fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Reads the persisted offline state. An absent file is the rest state, not
/// an error; an unreadable or unparsable file is surfaced as `StoreError`.
pub fn load_offline_state(layout: &StateLayout) -> Result<OfflineState, StoreError> {
    let path = layout.state_path();
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(OfflineState::default()),
        Err(err) => return Err(StoreError::Read { path, source: err }),
    };

    serde_json::from_str(&raw).map_err(|err| StoreError::Corrupt {
        path,
        detail: err.to_string(),
    })
}

/// Persists the offline state with an atomic replace, so a crash mid-write
/// leaves the previous record intact.
pub fn store_offline_state(layout: &StateLayout, state: &OfflineState) -> Result<(), StoreError> {
    let content = serde_json::to_string_pretty(state).map_err(|err| StoreError::Corrupt {
        path: layout.state_path(),
        detail: err.to_string(),
    })?;
    replace_file(&layout.state_path(), content.as_bytes())
}

/// Persists the encoded transaction document, same atomic-replace contract.
pub fn store_transaction_document(layout: &StateLayout, document: &str) -> Result<(), StoreError> {
    replace_file(&layout.transaction_path(), document.as_bytes())
}

fn replace_file(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    // The temp file lives next to the target so the rename stays on one
    // filesystem.
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = Path::new(&temp);

    fs::write(temp, content).map_err(|err| StoreError::Write {
        path: temp.to_path_buf(),
        source: err,
    })?;
    fs::rename(temp, path).map_err(|err| StoreError::Replace {
        path: path.to_path_buf(),
        source: err,
    })
}

pub(crate) fn remove_file_if_exists(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StoreError::Remove {
            path: path.to_path_buf(),
            source: err,
        }),
    }
}

pub(crate) fn remove_dir_if_exists(path: &Path) -> Result<(), StoreError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StoreError::Remove {
            path: path.to_path_buf(),
            source: err,
        }),
    }
}
