use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use ironpm_offline::{BootManager, Goal};
use ironpm_replay::{parse_transaction_replay, serialize_transaction_replay, TransactionReplay};

/// Drives the external resolver process.
///
/// Dependency resolution, package fetching and rpm application all live in
/// that collaborator; this side only exchanges transaction replay documents
/// with it over stdin/stdout. Its failures are surfaced unchanged.
pub(crate) struct ResolverGoal {
    program: PathBuf,
    installroot: PathBuf,
    releasever: Option<String>,
}

impl ResolverGoal {
    pub(crate) fn new(
        program: impl Into<PathBuf>,
        installroot: impl Into<PathBuf>,
        releasever: Option<String>,
    ) -> Self {
        Self {
            program: program.into(),
            installroot: installroot.into(),
            releasever,
        }
    }

    pub(crate) fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "--installroot".to_string(),
            self.installroot.display().to_string(),
        ];
        if let Some(releasever) = &self.releasever {
            args.push("--releasever".to_string());
            args.push(releasever.clone());
        }
        args
    }

    fn resolve(&self, mode: &str) -> Result<TransactionReplay> {
        let output = Command::new(&self.program)
            .arg("resolve")
            .arg(mode)
            .args(self.base_args())
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to run resolver {}", self.program.display()))?;
        if !output.status.success() {
            bail!(
                "resolver {mode} failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let document =
            String::from_utf8(output.stdout).context("resolver emitted non-UTF-8 output")?;
        Ok(parse_transaction_replay(&document)?)
    }

    fn run_with_document(
        &self,
        subcommand: &str,
        extra_args: &[String],
        replay: &TransactionReplay,
    ) -> Result<()> {
        let document = serialize_transaction_replay(replay)?;

        let mut child = Command::new(&self.program)
            .arg(subcommand)
            .args(extra_args)
            .args(self.base_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to run resolver {}", self.program.display()))?;

        child
            .stdin
            .take()
            .context("resolver stdin unavailable")?
            .write_all(document.as_bytes())
            .context("failed to send transaction to resolver")?;

        let output = child
            .wait_with_output()
            .with_context(|| format!("failed to wait for resolver {subcommand}"))?;
        if !output.status.success() {
            bail!(
                "resolver {subcommand} failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

impl Goal for ResolverGoal {
    fn resolve_upgrade(&self) -> Result<TransactionReplay> {
        self.resolve("upgrade")
    }

    fn resolve_distro_sync(&self) -> Result<TransactionReplay> {
        self.resolve("distro-sync")
    }

    fn download(&self, replay: &TransactionReplay, dest: &Path) -> Result<()> {
        let extra = vec!["--dest".to_string(), dest.display().to_string()];
        self.run_with_document("download", &extra, replay)
    }

    fn apply(&self, replay: &TransactionReplay) -> Result<()> {
        self.run_with_document("apply", &[], replay)
    }
}

/// Schedules the one-shot boot into the offline upgrade target: places the
/// update marker the early-boot generator looks for, then asks systemd to
/// reboot.
pub(crate) struct SystemdBoot {
    installroot: PathBuf,
    state_root: PathBuf,
}

impl SystemdBoot {
    pub(crate) fn new(installroot: impl Into<PathBuf>, state_root: impl Into<PathBuf>) -> Self {
        Self {
            installroot: installroot.into(),
            state_root: state_root.into(),
        }
    }

    pub(crate) fn marker_path(&self) -> PathBuf {
        self.installroot.join("system-update")
    }
}

impl BootManager for SystemdBoot {
    fn schedule_offline_boot(&self, _poweroff_after: bool) -> Result<()> {
        let marker = self.marker_path();
        let _ = std::fs::remove_file(&marker);
        std::os::unix::fs::symlink(&self.state_root, &marker)
            .with_context(|| format!("failed to create update marker {}", marker.display()))?;

        let status = Command::new("systemctl")
            .arg("reboot")
            .status()
            .context("failed to run systemctl reboot")?;
        if !status.success() {
            bail!("systemctl reboot failed with {status}");
        }
        Ok(())
    }
}
