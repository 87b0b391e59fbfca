mod codec;
mod error;
mod model;
mod vocab;

pub use codec::{parse_transaction_replay, serialize_transaction_replay};
pub use error::ReplayError;
pub use model::{
    EnvironmentReplay, GroupReplay, PackageReplay, ReplayVersion, TransactionReplay,
};
pub use vocab::{ActionKind, ReasonKind};
