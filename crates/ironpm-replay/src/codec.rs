use serde::Serialize;
use serde_json::Value;

use crate::{
    ActionKind, EnvironmentReplay, GroupReplay, PackageReplay, ReasonKind, ReplayError,
    ReplayVersion, TransactionReplay,
};

// Wire shapes. Field declaration order is the emitted key order, so encoding
// the same transaction always yields byte-identical output.

#[derive(Serialize)]
struct PackageElement<'a> {
    nevra: &'a str,
    action: &'static str,
    reason: &'static str,
    repo_id: &'a str,
    #[serde(skip_serializing_if = "skip_empty")]
    package_path: &'a str,
    #[serde(skip_serializing_if = "skip_empty")]
    group_id: &'a str,
}

#[derive(Serialize)]
struct GroupElement<'a> {
    id: &'a str,
    action: &'static str,
    reason: &'static str,
    repo_id: &'a str,
}

#[derive(Serialize)]
struct EnvironmentElement<'a> {
    id: &'a str,
    action: &'static str,
    repo_id: &'a str,
}

#[derive(Serialize)]
struct ReplayDocument<'a> {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    rpms: Vec<PackageElement<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    groups: Vec<GroupElement<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    environments: Vec<EnvironmentElement<'a>>,
    version: String,
}

fn skip_empty(value: &&str) -> bool {
    value.is_empty()
}

fn check_count(kind: &'static str, count: usize) -> Result<(), ReplayError> {
    if i32::try_from(count).is_err() {
        return Err(ReplayError::TooLarge { kind, count });
    }
    Ok(())
}

// The wire contract has no action-less items; only a decoded-incomplete
// document can produce one, and re-encoding it must fail rather than emit an
// element the next decoder cannot replay.
fn require_action(
    action: Option<ActionKind>,
    kind: &'static str,
    identity: &str,
) -> Result<&'static str, ReplayError> {
    match action {
        Some(action) => Ok(action.as_str()),
        None => Err(ReplayError::MissingAction {
            kind,
            identity: identity.to_string(),
        }),
    }
}

/// Encodes a captured transaction into its durable document form.
///
/// Empty collections are omitted entirely rather than emitted as empty
/// arrays. Every emitted item carries its action; an item without one is
/// `ReplayError::MissingAction`. The `version` key always carries the
/// codec's own supported version, never the version of a previously decoded
/// input.
pub fn serialize_transaction_replay(replay: &TransactionReplay) -> Result<String, ReplayError> {
    check_count("packages", replay.packages.len())?;
    check_count("groups", replay.groups.len())?;
    check_count("environments", replay.environments.len())?;

    let document = ReplayDocument {
        rpms: replay
            .packages
            .iter()
            .map(|pkg| {
                Ok(PackageElement {
                    nevra: &pkg.nevra,
                    action: require_action(pkg.action, "package", &pkg.nevra)?,
                    reason: pkg.reason.as_str(),
                    repo_id: &pkg.repo_id,
                    package_path: &pkg.package_path,
                    group_id: &pkg.group_id,
                })
            })
            .collect::<Result<Vec<_>, ReplayError>>()?,
        groups: replay
            .groups
            .iter()
            .map(|group| {
                Ok(GroupElement {
                    id: &group.group_id,
                    action: require_action(group.action, "group", &group.group_id)?,
                    reason: group.reason.as_str(),
                    repo_id: &group.repo_id,
                })
            })
            .collect::<Result<Vec<_>, ReplayError>>()?,
        environments: replay
            .environments
            .iter()
            .map(|environment| {
                Ok(EnvironmentElement {
                    id: &environment.environment_id,
                    action: require_action(
                        environment.action,
                        "environment",
                        &environment.environment_id,
                    )?,
                    repo_id: &environment.repo_id,
                })
            })
            .collect::<Result<Vec<_>, ReplayError>>()?,
        version: ReplayVersion::SUPPORTED.as_wire(),
    };

    serde_json::to_string(&document).map_err(|err| ReplayError::MalformedDocument(err.to_string()))
}

fn parse_version(document: &Value) -> Result<ReplayVersion, ReplayError> {
    let Some(version) = document.get("version").and_then(Value::as_str) else {
        // Documents predating the version key are accepted as-is.
        return Ok(ReplayVersion::SUPPORTED);
    };

    let mut parts = version.splitn(2, '.');
    let major = parts.next().unwrap_or(version);
    let supported = ReplayVersion::SUPPORTED.major.to_string();
    if major != supported {
        return Err(ReplayError::IncompatibleMajorVersion {
            found: major.to_string(),
            supported,
        });
    }

    let minor = parts
        .next()
        .and_then(|raw| raw.parse::<u32>().ok())
        .unwrap_or(0);
    Ok(ReplayVersion {
        major: ReplayVersion::SUPPORTED.major,
        minor,
    })
}

fn parse_action(element: &Value) -> Result<Option<ActionKind>, ReplayError> {
    match element.get("action").and_then(Value::as_str) {
        Some(raw) => Ok(Some(ActionKind::parse(raw)?)),
        None => Ok(None),
    }
}

fn parse_reason(element: &Value) -> Result<ReasonKind, ReplayError> {
    match element.get("reason").and_then(Value::as_str) {
        Some(raw) => ReasonKind::parse(raw),
        None => Ok(ReasonKind::None),
    }
}

fn string_field(element: &Value, key: &str) -> String {
    element
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Decodes a stored transaction document back into a `TransactionReplay`.
///
/// Every array element populates a fresh, fully-defaulted record; a key
/// absent from one element never inherits the value of a previous element.
/// Unrecognized keys are ignored so minor-version additions stay readable.
/// Missing `nevra`/`id`/`action` values are tolerated here and rejected
/// later, before the transaction is re-applied.
pub fn parse_transaction_replay(input: &str) -> Result<TransactionReplay, ReplayError> {
    if input.is_empty() {
        return Err(ReplayError::EmptyInput);
    }

    let document: Value = serde_json::from_str(input)
        .map_err(|err| ReplayError::MalformedDocument(err.to_string()))?;
    if !document.is_object() {
        return Err(ReplayError::MalformedDocument(
            "expected a top-level object".to_string(),
        ));
    }

    let mut replay = TransactionReplay {
        version: parse_version(&document)?,
        ..TransactionReplay::default()
    };

    if let Some(elements) = document.get("environments").and_then(Value::as_array) {
        for element in elements {
            replay.environments.push(EnvironmentReplay {
                action: parse_action(element)?,
                environment_id: string_field(element, "id"),
                repo_id: string_field(element, "repo_id"),
            });
        }
    }

    if let Some(elements) = document.get("groups").and_then(Value::as_array) {
        for element in elements {
            replay.groups.push(GroupReplay {
                action: parse_action(element)?,
                reason: parse_reason(element)?,
                group_id: string_field(element, "id"),
                repo_id: string_field(element, "repo_id"),
            });
        }
    }

    if let Some(elements) = document.get("rpms").and_then(Value::as_array) {
        for element in elements {
            replay.packages.push(PackageReplay {
                action: parse_action(element)?,
                reason: parse_reason(element)?,
                group_id: string_field(element, "group_id"),
                nevra: string_field(element, "nevra"),
                package_path: string_field(element, "package_path"),
                repo_id: string_field(element, "repo_id"),
            });
        }
    }

    Ok(replay)
}
