use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// On-disk configuration read from `<installroot>/etc/ironpm/offline.toml`.
/// Every field is optional; an absent file means defaults throughout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OfflineConfig {
    #[serde(default)]
    pub cachedir: Option<PathBuf>,
    #[serde(default)]
    pub releasever: Option<String>,
}

impl OfflineConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("failed to parse offline upgrade config")
    }
}

pub fn load_offline_config(installroot: &Path) -> Result<OfflineConfig> {
    let path = installroot.join("etc/ironpm/offline.toml");
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(OfflineConfig::default()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    OfflineConfig::from_toml_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))
}

/// Resolves the state directory root.
///
/// An explicit download-directory override wins over the configured cache
/// directory, which wins over the well-known default. Relative paths are
/// anchored at the install root.
pub fn resolve_state_root(
    installroot: &Path,
    downloaddir: Option<&Path>,
    config: &OfflineConfig,
) -> PathBuf {
    let chosen = match (downloaddir, config.cachedir.as_deref()) {
        (Some(dir), _) => dir,
        (None, Some(dir)) => dir,
        (None, None) => Path::new("var/lib/ironpm/offline"),
    };

    if chosen.is_absolute() {
        chosen.to_path_buf()
    } else {
        installroot.join(chosen)
    }
}
