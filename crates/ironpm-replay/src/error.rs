/// Failures raised while encoding or decoding a stored transaction.
///
/// None of these are retryable: they indicate a corrupt, incompatible or
/// oversized document and must be surfaced to the operator verbatim.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReplayError {
    #[error("serialized transaction input is empty")]
    EmptyInput,

    #[error("error parsing serialized transaction: {0}")]
    MalformedDocument(String),

    #[error("incompatible major version: \"{found}\", supported major version is \"{supported}\"")]
    IncompatibleMajorVersion { found: String, supported: String },

    #[error("unknown {kind} in serialized transaction: \"{raw}\"")]
    UnknownVocabulary { kind: &'static str, raw: String },

    #[error("cannot serialize transaction with {count} {kind}")]
    TooLarge { kind: &'static str, count: usize },

    #[error("cannot serialize {kind} \"{identity}\" without an action")]
    MissingAction { kind: &'static str, identity: String },
}
