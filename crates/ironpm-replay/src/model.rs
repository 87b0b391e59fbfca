use crate::{ActionKind, ReasonKind};

/// Schema version of a stored transaction, serialized as `"major.minor"`.
///
/// MAJOR denotes backwards-incompatible changes (an old decoder must refuse
/// the document). MINOR denotes format extensions an old decoder can still
/// read by ignoring unknown keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayVersion {
    pub major: u32,
    pub minor: u32,
}

impl ReplayVersion {
    pub const SUPPORTED: ReplayVersion = ReplayVersion { major: 1, minor: 0 };

    pub fn as_wire(&self) -> String {
        format!("{}.{}", self.major, self.minor)
    }
}

impl Default for ReplayVersion {
    fn default() -> Self {
        Self::SUPPORTED
    }
}

/// One package action captured from a resolved transaction.
///
/// `nevra` is the item identity and must never be empty in a replayable
/// document. `package_path` is set only for locally supplied packages and
/// `group_id` only when the package was pulled in as a group member; an empty
/// string means the key is omitted on the wire. `action` is `None` only when
/// a stored element omitted the key entirely; such an item is tolerated by
/// the parser but rejected before replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageReplay {
    pub action: Option<ActionKind>,
    pub reason: ReasonKind,
    pub group_id: String,
    pub nevra: String,
    pub package_path: String,
    pub repo_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupReplay {
    pub action: Option<ActionKind>,
    pub reason: ReasonKind,
    pub group_id: String,
    pub repo_id: String,
}

/// Environments carry no reason; they are installed or removed as a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentReplay {
    pub action: Option<ActionKind>,
    pub environment_id: String,
    pub repo_id: String,
}

/// A resolved transaction captured as data, ready to be stored and later
/// re-applied verbatim without re-resolving dependencies.
///
/// Sequence order is the insertion order of the originating transaction and
/// matters only for display; replay forces the recorded action per item
/// regardless of order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionReplay {
    pub packages: Vec<PackageReplay>,
    pub groups: Vec<GroupReplay>,
    pub environments: Vec<EnvironmentReplay>,
    pub version: ReplayVersion,
}

impl TransactionReplay {
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.groups.is_empty() && self.environments.is_empty()
    }
}
