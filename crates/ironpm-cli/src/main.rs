use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use ironpm_offline::PreconditionError;

mod dispatch;
mod render;
mod system;

use dispatch::run_cli;

#[derive(Parser, Debug)]
#[command(name = "ironpm", version)]
#[command(about = "Offline upgrade tooling for the ironpm package manager", long_about = None)]
struct Cli {
    /// Operate on an alternate install root.
    #[arg(long, default_value = "/")]
    installroot: PathBuf,
    /// Resolver backend executable.
    #[arg(long, default_value = "ironpm-resolver")]
    resolver: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Prepare the system for upgrade to a new release.
    #[command(
        subcommand,
        name = "system-upgrade",
        subcommand_required = true,
        arg_required_else_help = false
    )]
    SystemUpgrade(SystemUpgradeCommand),
}

#[derive(Subcommand, Debug)]
enum SystemUpgradeCommand {
    /// Download everything needed to upgrade to a new release.
    Download {
        /// Redirect download of packages to the provided path.
        #[arg(long)]
        downloaddir: Option<PathBuf>,
        /// Do not install packages from the new release if they are older
        /// than what is currently installed.
        #[arg(long, default_value_t = true, action = ArgAction::Set, value_name = "BOOL")]
        no_downgrade: bool,
        /// Target release version.
        #[arg(long)]
        releasever: Option<String>,
    },
    /// Reboot into the offline upgrade environment.
    Reboot {
        /// Power off instead of rebooting once the upgrade finishes.
        #[arg(long)]
        poweroff: bool,
    },
    /// Apply the downloaded upgrade. Run by the offline boot target, not
    /// interactively.
    Upgrade,
    /// Remove the downloaded data and reset the upgrade state.
    Clean,
    /// Show the status log of the offline upgrade.
    Log,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run_cli(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(precondition) = err.downcast_ref::<PreconditionError>() {
                eprintln!("{precondition}");
            } else {
                eprintln!("error: {err:#}");
            }
            ExitCode::from(1)
        }
    }
}
