mod config;
mod error;
mod layout;
mod stages;
mod state;

pub use config::{load_offline_config, resolve_state_root, OfflineConfig};
pub use error::{PreconditionError, StoreError};
pub use layout::StateLayout;
pub use stages::{
    apply_stage, check_stage, clean_stage, detect_releasever, download_stage, log_stage,
    reboot_stage, BootManager, DownloadRequest, Goal, OfflineCommand,
};
pub use state::{
    load_offline_state, store_offline_state, store_transaction_document, OfflineStage,
    OfflineState, StatusEntry,
};

#[cfg(test)]
mod tests;
