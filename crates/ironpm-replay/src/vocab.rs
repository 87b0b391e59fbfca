use crate::ReplayError;

/// Action recorded for a transaction item.
///
/// The wire encoding is a closed vocabulary: both directions of the mapping
/// are exhaustive, and an unrecognized string is a hard decode failure rather
/// than a fallback. Silently remapping an action would change what gets
/// applied to the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Install,
    Upgrade,
    Downgrade,
    Reinstall,
    Remove,
    Replaced,
    ReasonChange,
    Enable,
    Disable,
    Reset,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Upgrade => "upgrade",
            Self::Downgrade => "downgrade",
            Self::Reinstall => "reinstall",
            Self::Remove => "remove",
            Self::Replaced => "replaced",
            Self::ReasonChange => "reason-change",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Reset => "reset",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ReplayError> {
        match value {
            "install" => Ok(Self::Install),
            "upgrade" => Ok(Self::Upgrade),
            "downgrade" => Ok(Self::Downgrade),
            "reinstall" => Ok(Self::Reinstall),
            "remove" => Ok(Self::Remove),
            "replaced" => Ok(Self::Replaced),
            "reason-change" => Ok(Self::ReasonChange),
            "enable" => Ok(Self::Enable),
            "disable" => Ok(Self::Disable),
            "reset" => Ok(Self::Reset),
            _ => Err(ReplayError::UnknownVocabulary {
                kind: "action",
                raw: value.to_string(),
            }),
        }
    }
}

/// Why a transaction item was selected.
///
/// `None` is a real member of the vocabulary, not an absence marker; an item
/// whose stored element omits the `reason` key decodes to it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReasonKind {
    #[default]
    None,
    User,
    Dependency,
    WeakDependency,
    Group,
    Clean,
    External,
}

impl ReasonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::User => "user-requested",
            Self::Dependency => "dependency-pulled",
            Self::WeakDependency => "weak-dependency-pulled",
            Self::Group => "group-pulled",
            Self::Clean => "clean-up",
            Self::External => "external",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ReplayError> {
        match value {
            "none" => Ok(Self::None),
            "user-requested" => Ok(Self::User),
            "dependency-pulled" => Ok(Self::Dependency),
            "weak-dependency-pulled" => Ok(Self::WeakDependency),
            "group-pulled" => Ok(Self::Group),
            "clean-up" => Ok(Self::Clean),
            "external" => Ok(Self::External),
            _ => Err(ReplayError::UnknownVocabulary {
                kind: "reason",
                raw: value.to_string(),
            }),
        }
    }
}
