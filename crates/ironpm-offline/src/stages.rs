use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ironpm_replay::{parse_transaction_replay, serialize_transaction_replay, TransactionReplay};

use crate::state::{current_unix_timestamp, remove_dir_if_exists, remove_file_if_exists};
use crate::{
    load_offline_state, store_offline_state, store_transaction_document, OfflineStage,
    OfflineState, PreconditionError, StateLayout, StatusEntry, StoreError,
};

pub const DOWNLOAD_STARTED_ID: &str = "download-started";
pub const DOWNLOAD_FINISHED_ID: &str = "download-finished";
pub const REBOOT_REQUESTED_ID: &str = "reboot-requested";
pub const UPGRADE_STARTED_ID: &str = "upgrade-started";
pub const UPGRADE_FINISHED_ID: &str = "upgrade-finished";

/// The resolution and application collaborator. Implementations resolve a
/// transaction against live repository state, fetch its packages, and later
/// re-apply a captured transaction with every recorded action forced.
pub trait Goal {
    fn resolve_upgrade(&self) -> Result<TransactionReplay>;
    fn resolve_distro_sync(&self) -> Result<TransactionReplay>;
    fn download(&self, replay: &TransactionReplay, dest: &Path) -> Result<()>;
    fn apply(&self, replay: &TransactionReplay) -> Result<()>;
}

/// Schedules the one-shot boot into the minimal offline-upgrade context.
pub trait BootManager {
    fn schedule_offline_boot(&self, poweroff_after: bool) -> Result<()>;
}

/// The operator-visible commands of the offline upgrade lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineCommand {
    Download,
    Reboot,
    Apply,
    Clean,
    Log,
}

impl std::fmt::Display for OfflineCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Download => "system-upgrade download",
            Self::Reboot => "system-upgrade reboot",
            Self::Apply => "system-upgrade upgrade",
            Self::Clean => "system-upgrade clean",
            Self::Log => "system-upgrade log",
        })
    }
}

/// Pure stage gate: decides whether `command` may run while the persisted
/// state sits in `stage`. Every stage entry goes through this, so each
/// legal and illegal pair is testable without filesystem or reboot side
/// effects.
pub fn check_stage(stage: OfflineStage, command: OfflineCommand) -> Result<(), PreconditionError> {
    let allowed = match command {
        OfflineCommand::Download => matches!(
            stage,
            OfflineStage::None | OfflineStage::Cleaned | OfflineStage::DownloadIncomplete
        ),
        OfflineCommand::Reboot => stage == OfflineStage::DownloadFinished,
        OfflineCommand::Apply => matches!(
            stage,
            OfflineStage::RebootRequested | OfflineStage::UpgradeInProgress
        ),
        OfflineCommand::Clean | OfflineCommand::Log => true,
    };

    if allowed {
        Ok(())
    } else {
        Err(PreconditionError::WrongStage { command, stage })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub system_releasever: String,
    pub target_releasever: String,
    /// When set, resolve a plain upgrade; otherwise distro-sync, which may
    /// install packages older than what is currently installed.
    pub no_downgrade: bool,
}

/// Reads the system releasever of the installation under `installroot`.
pub fn detect_releasever(installroot: &Path) -> Result<String> {
    let path = installroot.join("etc/ironpm/releasever");
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("cannot detect system releasever from {}", path.display()))?;
    let releasever = raw.trim();
    if releasever.is_empty() {
        bail!("system releasever file is empty: {}", path.display());
    }
    Ok(releasever.to_string())
}

/// Resolves and captures the upgrade transaction, downloads its packages and
/// persists both the document and the state record.
///
/// All preconditions are checked before anything is written, so a rejected
/// download leaves no persisted state behind.
pub fn download_stage(
    layout: &StateLayout,
    goal: &dyn Goal,
    request: &DownloadRequest,
) -> Result<()> {
    if request.target_releasever == request.system_releasever {
        return Err(PreconditionError::SameReleasever(request.system_releasever.clone()).into());
    }

    let mut state = load_offline_state(layout)?;
    check_stage(state.stage, OfflineCommand::Download)?;

    let replay = if request.no_downgrade {
        goal.resolve_upgrade()?
    } else {
        goal.resolve_distro_sync()?
    };
    if replay.is_empty() {
        return Err(PreconditionError::NothingToDo.into());
    }

    layout.ensure_base_dirs()?;
    state.stage = OfflineStage::DownloadIncomplete;
    state.system_releasever = request.system_releasever.clone();
    state.target_releasever = request.target_releasever.clone();
    state.log_status(DOWNLOAD_STARTED_ID, "Download started.", current_unix_timestamp());
    store_offline_state(layout, &state)?;

    goal.download(&replay, &layout.packages_dir())?;
    store_transaction_document(layout, &serialize_transaction_replay(&replay)?)?;

    state.stage = OfflineStage::DownloadFinished;
    state.log_status(DOWNLOAD_FINISHED_ID, "Download finished.", current_unix_timestamp());
    store_offline_state(layout, &state)?;
    Ok(())
}

/// Marks the reboot as requested and hands off to the boot manager. The
/// state record is replaced first so the early-boot context finds the stage
/// it expects even if this process dies right after scheduling.
pub fn reboot_stage(layout: &StateLayout, boot: &dyn BootManager, poweroff_after: bool) -> Result<()> {
    let mut state = load_offline_state(layout)?;
    check_stage(state.stage, OfflineCommand::Reboot)?;

    state.stage = OfflineStage::RebootRequested;
    state.poweroff_after = poweroff_after;
    state.log_status(REBOOT_REQUESTED_ID, "Reboot requested.", current_unix_timestamp());
    store_offline_state(layout, &state)?;

    boot.schedule_offline_boot(poweroff_after)
}

fn check_replayable(replay: &TransactionReplay) -> Result<()> {
    for (index, package) in replay.packages.iter().enumerate() {
        if package.nevra.is_empty() {
            bail!("cannot replay package at index {index}: missing nevra");
        }
        if package.action.is_none() {
            bail!("cannot replay package \"{}\": missing action", package.nevra);
        }
    }
    for (index, group) in replay.groups.iter().enumerate() {
        if group.group_id.is_empty() {
            bail!("cannot replay group at index {index}: missing id");
        }
        if group.action.is_none() {
            bail!("cannot replay group \"{}\": missing action", group.group_id);
        }
    }
    for (index, environment) in replay.environments.iter().enumerate() {
        if environment.environment_id.is_empty() {
            bail!("cannot replay environment at index {index}: missing id");
        }
        if environment.action.is_none() {
            bail!(
                "cannot replay environment \"{}\": missing action",
                environment.environment_id
            );
        }
    }
    Ok(())
}

/// Applies the captured transaction inside the offline execution context.
///
/// Re-entrant: finding the stage at `upgrade-in-progress` means a previous
/// attempt was interrupted and this invocation resumes it. The stage is
/// advanced and persisted before the goal runs, so an interruption is
/// observable rather than silently retried.
pub fn apply_stage(layout: &StateLayout, goal: &dyn Goal) -> Result<()> {
    let mut state = load_offline_state(layout)?;
    check_stage(state.stage, OfflineCommand::Apply)?;
    let resuming = state.stage == OfflineStage::UpgradeInProgress;

    let path = layout.transaction_path();
    let document = fs::read_to_string(&path).map_err(|err| StoreError::Read {
        path: path.clone(),
        source: err,
    })?;
    let replay = parse_transaction_replay(&document)
        .with_context(|| format!("stored transaction {} is not replayable", path.display()))?;
    check_replayable(&replay)?;

    state.stage = OfflineStage::UpgradeInProgress;
    let message = if resuming {
        "Resuming interrupted upgrade."
    } else {
        "Upgrade started."
    };
    state.log_status(UPGRADE_STARTED_ID, message, current_unix_timestamp());
    store_offline_state(layout, &state)?;

    goal.apply(&replay)?;

    state.stage = OfflineStage::UpgradeFinished;
    state.log_status(UPGRADE_FINISHED_ID, "Upgrade finished.", current_unix_timestamp());
    store_offline_state(layout, &state)?;
    Ok(())
}

/// Removes the captured transaction, the package cache and the state record.
///
/// Permitted from any stage and best-effort: every removal is attempted even
/// when an earlier one fails, and nothing here depends on the persisted
/// document being parsable.
pub fn clean_stage(layout: &StateLayout) -> Result<()> {
    let mut first_failure: Option<StoreError> = None;
    let mut note = |result: Result<(), StoreError>| {
        if let Err(err) = result {
            tracing::warn!("clean: {err}");
            first_failure.get_or_insert(err);
        }
    };

    note(remove_file_if_exists(&layout.transaction_path()));
    note(remove_dir_if_exists(&layout.packages_dir()));
    note(remove_file_if_exists(&layout.state_path()));

    match first_failure {
        None => Ok(()),
        Some(err) => Err(err.into()),
    }
}

/// Read-only view of the status log. Never mutates state.
pub fn log_stage(layout: &StateLayout) -> Result<Vec<StatusEntry>> {
    let state: OfflineState = load_offline_state(layout)?;
    Ok(state.status_log)
}
