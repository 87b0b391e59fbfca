use std::path::Path;

use anyhow::{Context, Result};
use ironpm_offline::{
    apply_stage, clean_stage, detect_releasever, download_stage, load_offline_config, log_stage,
    reboot_stage, resolve_state_root, DownloadRequest, OfflineConfig, StateLayout,
};

use crate::render::format_status_lines;
use crate::system::{ResolverGoal, SystemdBoot};
use crate::{Cli, Commands, SystemUpgradeCommand};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let Commands::SystemUpgrade(command) = cli.command;
    run_system_upgrade(&cli.installroot, &cli.resolver, command)
}

fn default_layout(installroot: &Path, config: &OfflineConfig) -> StateLayout {
    StateLayout::new(resolve_state_root(installroot, None, config))
}

fn run_system_upgrade(
    installroot: &Path,
    resolver: &Path,
    command: SystemUpgradeCommand,
) -> Result<()> {
    let config = load_offline_config(installroot)?;

    match command {
        SystemUpgradeCommand::Download {
            downloaddir,
            no_downgrade,
            releasever,
        } => {
            let layout = StateLayout::new(resolve_state_root(
                installroot,
                downloaddir.as_deref(),
                &config,
            ));
            let system_releasever = detect_releasever(installroot)?;
            let target_releasever = releasever
                .or_else(|| config.releasever.clone())
                .context("no target release version; pass --releasever or set it in offline.toml")?;

            let goal = ResolverGoal::new(resolver, installroot, Some(target_releasever.clone()));
            download_stage(
                &layout,
                &goal,
                &DownloadRequest {
                    system_releasever,
                    target_releasever,
                    no_downgrade,
                },
            )?;
            println!("Download complete! Use `ironpm system-upgrade reboot` to start the upgrade.");
            println!(
                "To cancel the upgrade and delete the downloaded data, use `ironpm system-upgrade clean`."
            );
        }
        SystemUpgradeCommand::Reboot { poweroff } => {
            let layout = default_layout(installroot, &config);
            let boot = SystemdBoot::new(installroot, layout.root());
            reboot_stage(&layout, &boot, poweroff)?;
        }
        SystemUpgradeCommand::Upgrade => {
            let layout = default_layout(installroot, &config);
            let goal = ResolverGoal::new(resolver, installroot, None);
            apply_stage(&layout, &goal)?;
            println!("Upgrade complete!");
        }
        SystemUpgradeCommand::Clean => {
            let layout = default_layout(installroot, &config);
            clean_stage(&layout)?;
            println!("Cleaned up downloaded data.");
        }
        SystemUpgradeCommand::Log => {
            let layout = default_layout(installroot, &config);
            for line in format_status_lines(&log_stage(&layout)?) {
                println!("{line}");
            }
        }
    }

    Ok(())
}
