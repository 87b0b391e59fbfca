use super::*;

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use ironpm_replay::{ActionKind, PackageReplay, ReasonKind, TransactionReplay};

fn test_layout() -> StateLayout {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    StateLayout::new(
        std::env::temp_dir().join(format!("ironpm-offline-test-{nanos}-{}", std::process::id())),
    )
}

fn sample_replay() -> TransactionReplay {
    TransactionReplay {
        packages: vec![PackageReplay {
            action: Some(ActionKind::Upgrade),
            reason: ReasonKind::User,
            nevra: "foo-1.2-3.x86_64".to_string(),
            repo_id: "updates".to_string(),
            ..PackageReplay::default()
        }],
        ..TransactionReplay::default()
    }
}

fn sample_request() -> DownloadRequest {
    DownloadRequest {
        system_releasever: "40".to_string(),
        target_releasever: "41".to_string(),
        no_downgrade: true,
    }
}

#[derive(Default)]
struct FakeGoal {
    resolved: TransactionReplay,
    fail_apply: bool,
    upgrade_calls: RefCell<u32>,
    distro_sync_calls: RefCell<u32>,
    downloads: RefCell<Vec<PathBuf>>,
    applied: RefCell<Vec<TransactionReplay>>,
}

impl Goal for FakeGoal {
    fn resolve_upgrade(&self) -> anyhow::Result<TransactionReplay> {
        *self.upgrade_calls.borrow_mut() += 1;
        Ok(self.resolved.clone())
    }

    fn resolve_distro_sync(&self) -> anyhow::Result<TransactionReplay> {
        *self.distro_sync_calls.borrow_mut() += 1;
        Ok(self.resolved.clone())
    }

    fn download(&self, _replay: &TransactionReplay, dest: &Path) -> anyhow::Result<()> {
        self.downloads.borrow_mut().push(dest.to_path_buf());
        Ok(())
    }

    fn apply(&self, replay: &TransactionReplay) -> anyhow::Result<()> {
        if self.fail_apply {
            return Err(anyhow!("rpm application failed"));
        }
        self.applied.borrow_mut().push(replay.clone());
        Ok(())
    }
}

#[derive(Default)]
struct FakeBootManager {
    scheduled: RefCell<Vec<bool>>,
}

impl BootManager for FakeBootManager {
    fn schedule_offline_boot(&self, poweroff_after: bool) -> anyhow::Result<()> {
        self.scheduled.borrow_mut().push(poweroff_after);
        Ok(())
    }
}

fn seed_state(layout: &StateLayout, stage: OfflineStage) {
    layout.ensure_base_dirs().expect("must create dirs");
    let state = OfflineState {
        stage,
        system_releasever: "40".to_string(),
        target_releasever: "41".to_string(),
        ..OfflineState::default()
    };
    store_offline_state(layout, &state).expect("must store state");
}

fn seed_transaction(layout: &StateLayout, replay: &TransactionReplay) {
    layout.ensure_base_dirs().expect("must create dirs");
    let document =
        ironpm_replay::serialize_transaction_replay(replay).expect("must serialize replay");
    store_transaction_document(layout, &document).expect("must store transaction");
}

#[test]
fn stage_gate_accepts_every_legal_transition() {
    let legal = [
        (OfflineStage::None, OfflineCommand::Download),
        (OfflineStage::Cleaned, OfflineCommand::Download),
        (OfflineStage::DownloadIncomplete, OfflineCommand::Download),
        (OfflineStage::DownloadFinished, OfflineCommand::Reboot),
        (OfflineStage::RebootRequested, OfflineCommand::Apply),
        (OfflineStage::UpgradeInProgress, OfflineCommand::Apply),
        (OfflineStage::UpgradeFinished, OfflineCommand::Clean),
        (OfflineStage::None, OfflineCommand::Log),
    ];
    for (stage, command) in legal {
        assert!(
            check_stage(stage, command).is_ok(),
            "{command} should be allowed from {stage}"
        );
    }
}

#[test]
fn stage_gate_rejects_illegal_transitions() {
    let illegal = [
        (OfflineStage::DownloadFinished, OfflineCommand::Download),
        (OfflineStage::RebootRequested, OfflineCommand::Download),
        (OfflineStage::UpgradeFinished, OfflineCommand::Download),
        (OfflineStage::None, OfflineCommand::Reboot),
        (OfflineStage::DownloadIncomplete, OfflineCommand::Reboot),
        (OfflineStage::UpgradeFinished, OfflineCommand::Reboot),
        (OfflineStage::None, OfflineCommand::Apply),
        (OfflineStage::DownloadFinished, OfflineCommand::Apply),
        (OfflineStage::UpgradeFinished, OfflineCommand::Apply),
    ];
    for (stage, command) in illegal {
        let err = check_stage(stage, command).expect_err("transition must be rejected");
        match err {
            PreconditionError::WrongStage {
                command: found_command,
                stage: found_stage,
            } => {
                assert_eq!(found_command, command);
                assert_eq!(found_stage, stage);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

#[test]
fn clean_and_log_are_allowed_from_every_stage() {
    let stages = [
        OfflineStage::None,
        OfflineStage::DownloadIncomplete,
        OfflineStage::DownloadFinished,
        OfflineStage::RebootRequested,
        OfflineStage::UpgradeInProgress,
        OfflineStage::UpgradeFinished,
        OfflineStage::Cleaned,
    ];
    for stage in stages {
        assert!(check_stage(stage, OfflineCommand::Clean).is_ok());
        assert!(check_stage(stage, OfflineCommand::Log).is_ok());
    }
}

#[test]
fn download_rejects_same_releasever_without_writing_state() {
    let layout = test_layout();
    let goal = FakeGoal::default();
    let request = DownloadRequest {
        system_releasever: "40".to_string(),
        target_releasever: "40".to_string(),
        no_downgrade: true,
    };

    let err = download_stage(&layout, &goal, &request).expect_err("same releasever must fail");
    assert!(matches!(
        err.downcast_ref::<PreconditionError>(),
        Some(PreconditionError::SameReleasever(releasever)) if releasever == "40"
    ));
    assert_eq!(*goal.upgrade_calls.borrow(), 0);
    assert!(!layout.root().exists(), "no state may be created");
}

#[test]
fn download_rejects_empty_transaction_without_writing_state() {
    let layout = test_layout();
    let goal = FakeGoal::default();

    let err = download_stage(&layout, &goal, &sample_request())
        .expect_err("empty transaction must fail");
    assert!(matches!(
        err.downcast_ref::<PreconditionError>(),
        Some(PreconditionError::NothingToDo)
    ));
    assert!(goal.downloads.borrow().is_empty(), "nothing may be downloaded");
    assert!(!layout.root().exists(), "no state may be created");
}

#[test]
fn download_captures_transaction_and_advances_stage() {
    let layout = test_layout();
    let goal = FakeGoal {
        resolved: sample_replay(),
        ..FakeGoal::default()
    };

    download_stage(&layout, &goal, &sample_request()).expect("download must succeed");

    assert_eq!(*goal.upgrade_calls.borrow(), 1);
    assert_eq!(*goal.distro_sync_calls.borrow(), 0);
    assert_eq!(*goal.downloads.borrow(), vec![layout.packages_dir()]);

    let document =
        fs::read_to_string(layout.transaction_path()).expect("transaction must be stored");
    let stored = ironpm_replay::parse_transaction_replay(&document).expect("must parse");
    assert_eq!(stored, sample_replay());

    let state = load_offline_state(&layout).expect("must load state");
    assert_eq!(state.stage, OfflineStage::DownloadFinished);
    assert_eq!(state.system_releasever, "40");
    assert_eq!(state.target_releasever, "41");
    let stage_ids: Vec<&str> = state
        .status_log
        .iter()
        .map(|entry| entry.stage_id.as_str())
        .collect();
    assert_eq!(stage_ids, ["download-started", "download-finished"]);

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn download_uses_distro_sync_when_downgrades_are_allowed() {
    let layout = test_layout();
    let goal = FakeGoal {
        resolved: sample_replay(),
        ..FakeGoal::default()
    };
    let request = DownloadRequest {
        no_downgrade: false,
        ..sample_request()
    };

    download_stage(&layout, &goal, &request).expect("download must succeed");
    assert_eq!(*goal.upgrade_calls.borrow(), 0);
    assert_eq!(*goal.distro_sync_calls.borrow(), 1);

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn download_is_rejected_while_an_upgrade_is_pending() {
    let layout = test_layout();
    seed_state(&layout, OfflineStage::DownloadFinished);
    let goal = FakeGoal {
        resolved: sample_replay(),
        ..FakeGoal::default()
    };

    let err = download_stage(&layout, &goal, &sample_request()).expect_err("must be rejected");
    assert!(matches!(
        err.downcast_ref::<PreconditionError>(),
        Some(PreconditionError::WrongStage {
            command: OfflineCommand::Download,
            stage: OfflineStage::DownloadFinished,
        })
    ));

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn reboot_requires_a_finished_download() {
    let layout = test_layout();
    let boot = FakeBootManager::default();

    let err = reboot_stage(&layout, &boot, false).expect_err("must be rejected");
    assert!(matches!(
        err.downcast_ref::<PreconditionError>(),
        Some(PreconditionError::WrongStage {
            command: OfflineCommand::Reboot,
            stage: OfflineStage::None,
        })
    ));
    assert!(boot.scheduled.borrow().is_empty());
}

#[test]
fn reboot_persists_the_stage_before_scheduling() {
    let layout = test_layout();
    seed_state(&layout, OfflineStage::DownloadFinished);
    let boot = FakeBootManager::default();

    reboot_stage(&layout, &boot, true).expect("reboot must succeed");

    let state = load_offline_state(&layout).expect("must load state");
    assert_eq!(state.stage, OfflineStage::RebootRequested);
    assert!(state.poweroff_after);
    assert_eq!(*boot.scheduled.borrow(), vec![true]);

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn apply_replays_the_stored_transaction_verbatim() {
    let layout = test_layout();
    seed_state(&layout, OfflineStage::RebootRequested);
    seed_transaction(&layout, &sample_replay());
    let goal = FakeGoal::default();

    apply_stage(&layout, &goal).expect("apply must succeed");

    assert_eq!(*goal.applied.borrow(), vec![sample_replay()]);
    let state = load_offline_state(&layout).expect("must load state");
    assert_eq!(state.stage, OfflineStage::UpgradeFinished);
    let stage_ids: Vec<&str> = state
        .status_log
        .iter()
        .map(|entry| entry.stage_id.as_str())
        .collect();
    assert_eq!(stage_ids, ["upgrade-started", "upgrade-finished"]);

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn apply_resumes_an_interrupted_upgrade() {
    let layout = test_layout();
    seed_state(&layout, OfflineStage::UpgradeInProgress);
    seed_transaction(&layout, &sample_replay());
    let goal = FakeGoal::default();

    apply_stage(&layout, &goal).expect("resume must succeed");

    assert_eq!(goal.applied.borrow().len(), 1);
    let state = load_offline_state(&layout).expect("must load state");
    assert_eq!(state.stage, OfflineStage::UpgradeFinished);
    assert!(state
        .status_log
        .iter()
        .any(|entry| entry.message == "Resuming interrupted upgrade."));

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn apply_after_a_finished_upgrade_is_rejected() {
    let layout = test_layout();
    seed_state(&layout, OfflineStage::UpgradeFinished);
    seed_transaction(&layout, &sample_replay());
    let goal = FakeGoal::default();

    let err = apply_stage(&layout, &goal).expect_err("second apply must be rejected");
    assert!(matches!(
        err.downcast_ref::<PreconditionError>(),
        Some(PreconditionError::WrongStage {
            command: OfflineCommand::Apply,
            stage: OfflineStage::UpgradeFinished,
        })
    ));
    assert!(goal.applied.borrow().is_empty(), "nothing may be re-applied");

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn failed_apply_leaves_the_stage_at_upgrade_in_progress() {
    let layout = test_layout();
    seed_state(&layout, OfflineStage::RebootRequested);
    seed_transaction(&layout, &sample_replay());
    let goal = FakeGoal {
        fail_apply: true,
        ..FakeGoal::default()
    };

    let err = apply_stage(&layout, &goal).expect_err("apply must fail");
    assert!(err.to_string().contains("rpm application failed"));

    let state = load_offline_state(&layout).expect("must load state");
    assert_eq!(state.stage, OfflineStage::UpgradeInProgress);

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn apply_rejects_items_without_an_action() {
    let layout = test_layout();
    seed_state(&layout, OfflineStage::RebootRequested);
    store_transaction_document(
        &layout,
        "{\"rpms\": [{\"nevra\": \"foo-1.2-3.x86_64\"}], \"version\": \"1.0\"}",
    )
    .expect("must store transaction");
    let goal = FakeGoal::default();

    let err = apply_stage(&layout, &goal).expect_err("incomplete item must be rejected");
    assert!(err.to_string().contains("missing action"), "unexpected error: {err}");
    assert!(goal.applied.borrow().is_empty());

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn apply_rejects_items_without_an_identity() {
    let layout = test_layout();
    seed_state(&layout, OfflineStage::RebootRequested);
    store_transaction_document(
        &layout,
        "{\"groups\": [{\"action\": \"install\", \"reason\": \"user-requested\"}]}",
    )
    .expect("must store transaction");
    let goal = FakeGoal::default();

    let err = apply_stage(&layout, &goal).expect_err("incomplete item must be rejected");
    assert!(err.to_string().contains("missing id"), "unexpected error: {err}");

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn clean_removes_all_persisted_state() {
    let layout = test_layout();
    seed_state(&layout, OfflineStage::UpgradeInProgress);
    seed_transaction(&layout, &sample_replay());
    fs::write(layout.packages_dir().join("foo-1.2-3.x86_64.rpm"), b"rpm")
        .expect("must write package");

    clean_stage(&layout).expect("clean must succeed");

    assert!(!layout.state_path().exists());
    assert!(!layout.transaction_path().exists());
    assert!(!layout.packages_dir().exists());

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn clean_succeeds_even_with_a_corrupt_state_file() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    fs::write(layout.state_path(), b"{ not json").expect("must write garbage");
    fs::write(layout.transaction_path(), b"also { not json").expect("must write garbage");

    clean_stage(&layout).expect("clean must not depend on parsable state");
    assert!(!layout.state_path().exists());
    assert!(!layout.transaction_path().exists());

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn clean_of_an_absent_state_dir_is_a_no_op() {
    let layout = test_layout();
    clean_stage(&layout).expect("clean of nothing must succeed");
}

#[test]
fn log_returns_entries_in_append_order_without_mutating() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    let mut state = OfflineState {
        system_releasever: "40".to_string(),
        target_releasever: "41".to_string(),
        ..OfflineState::default()
    };
    state.log_status("download-finished", "Download finished.", 100);
    state.log_status("reboot-requested", "Reboot requested.", 200);
    store_offline_state(&layout, &state).expect("must store state");

    let entries = log_stage(&layout).expect("log must succeed");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].stage_id, "download-finished");
    assert_eq!(entries[0].recorded_at_unix, 100);
    assert_eq!(entries[0].system_releasever, "40");
    assert_eq!(entries[0].target_releasever, "41");
    assert_eq!(entries[1].stage_id, "reboot-requested");

    assert_eq!(log_stage(&layout).expect("log must succeed"), entries);

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn log_of_an_absent_state_dir_is_empty() {
    let layout = test_layout();
    assert!(log_stage(&layout).expect("log must succeed").is_empty());
}

#[test]
fn offline_state_round_trips_through_the_store() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    let mut state = OfflineState {
        stage: OfflineStage::DownloadFinished,
        system_releasever: "40".to_string(),
        target_releasever: "41".to_string(),
        poweroff_after: true,
        ..OfflineState::default()
    };
    state.log_status("download-finished", "Download finished.", 123);

    store_offline_state(&layout, &state).expect("must store");
    let loaded = load_offline_state(&layout).expect("must load");
    assert_eq!(loaded, state);

    let temp_leftovers: Vec<_> = fs::read_dir(layout.root())
        .expect("must list root")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) == Some("tmp"))
        .collect();
    assert!(temp_leftovers.is_empty(), "replace must not leave temp files");

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn persisted_state_uses_the_stage_tokens() {
    let layout = test_layout();
    seed_state(&layout, OfflineStage::DownloadFinished);

    let raw = fs::read_to_string(layout.state_path()).expect("must read state");
    assert!(
        raw.contains("\"stage\": \"download-finished\""),
        "unexpected state document: {raw}"
    );

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn unknown_stage_token_is_reported_as_corrupt() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    fs::write(layout.state_path(), b"{\"stage\": \"warp-speed\"}").expect("must write state");

    let err = load_offline_state(&layout).expect_err("unknown stage must fail");
    assert!(matches!(err, StoreError::Corrupt { .. }));

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn corrupt_state_file_is_reported_not_defaulted() {
    let layout = test_layout();
    layout.ensure_base_dirs().expect("must create dirs");
    fs::write(layout.state_path(), b"{ not json").expect("must write garbage");

    let err = load_offline_state(&layout).expect_err("corrupt state must fail");
    assert!(matches!(err, StoreError::Corrupt { .. }));

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn stage_tokens_round_trip() {
    let stages = [
        OfflineStage::None,
        OfflineStage::DownloadIncomplete,
        OfflineStage::DownloadFinished,
        OfflineStage::RebootRequested,
        OfflineStage::UpgradeInProgress,
        OfflineStage::UpgradeFinished,
        OfflineStage::Cleaned,
    ];
    for stage in stages {
        assert_eq!(OfflineStage::parse(stage.as_str()).expect("must parse"), stage);
    }
    assert!(OfflineStage::parse("warp-speed").is_err());
}

#[test]
fn detect_releasever_reads_the_trimmed_marker() {
    let layout = test_layout();
    let etc = layout.root().join("etc/ironpm");
    fs::create_dir_all(&etc).expect("must create dirs");
    fs::write(etc.join("releasever"), b"40\n").expect("must write releasever");

    let releasever = detect_releasever(layout.root()).expect("must detect");
    assert_eq!(releasever, "40");

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn detect_releasever_rejects_an_empty_marker() {
    let layout = test_layout();
    let etc = layout.root().join("etc/ironpm");
    fs::create_dir_all(&etc).expect("must create dirs");
    fs::write(etc.join("releasever"), b"\n").expect("must write releasever");

    assert!(detect_releasever(layout.root()).is_err());

    let _ = fs::remove_dir_all(layout.root());
}

#[test]
fn state_root_resolution_prefers_the_explicit_download_dir() {
    let config = OfflineConfig {
        cachedir: Some(PathBuf::from("var/cache/ironpm/offline")),
        releasever: None,
    };

    assert_eq!(
        resolve_state_root(Path::new("/"), Some(Path::new("upgrade-data")), &config),
        PathBuf::from("/upgrade-data")
    );
    assert_eq!(
        resolve_state_root(Path::new("/sysroot"), Some(Path::new("/abs/dir")), &config),
        PathBuf::from("/abs/dir")
    );
    assert_eq!(
        resolve_state_root(Path::new("/sysroot"), None, &config),
        PathBuf::from("/sysroot/var/cache/ironpm/offline")
    );
    assert_eq!(
        resolve_state_root(Path::new("/sysroot"), None, &OfflineConfig::default()),
        PathBuf::from("/sysroot/var/lib/ironpm/offline")
    );
}

#[test]
fn config_parses_known_fields_and_defaults_the_rest() {
    let config = OfflineConfig::from_toml_str(
        "cachedir = \"/var/cache/ironpm/offline\"\nreleasever = \"41\"\n",
    )
    .expect("must parse");
    assert_eq!(
        config.cachedir.as_deref(),
        Some(Path::new("/var/cache/ironpm/offline"))
    );
    assert_eq!(config.releasever.as_deref(), Some("41"));

    assert_eq!(
        OfflineConfig::from_toml_str("").expect("empty config must parse"),
        OfflineConfig::default()
    );
}

#[test]
fn absent_config_file_falls_back_to_defaults() {
    let layout = test_layout();
    assert_eq!(
        load_offline_config(layout.root()).expect("must load"),
        OfflineConfig::default()
    );
}
