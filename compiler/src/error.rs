// error.rs — Load-time error taxonomy
//
// Only failures that prevent building a snapshot or registry at all live
// here (I/O, malformed JSON, slot-type syntax, duplicate definitions).
// Semantic problems inside a well-formed patch are `Diagnostic`s, never
// errors.

use std::path::PathBuf;

/// Convenience result type for loading APIs.
pub type PatchResult<T> = Result<T, PatchError>;

#[derive(thiserror::Error, Debug)]
pub enum PatchError {
    /// Reading a file failed.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document did not match the expected shape.
    #[error("{context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// A slot-type string could not be parsed.
    #[error("invalid slot type '{input}': {message}")]
    SlotType { input: String, message: String },

    /// Build provenance was requested but could not be computed.
    #[error("build provenance unavailable for this compile")]
    ProvenanceUnavailable,

    /// Two registry documents define the same block type.
    #[error("duplicate block type '{block_type}': first defined in {first}, redefined in {second}")]
    DuplicateBlockType {
        block_type: String,
        first: String,
        second: String,
    },
}

impl PatchError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            context: context.into(),
            source,
        }
    }

    pub fn slot_type(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SlotType {
            input: input.into(),
            message: message.into(),
        }
    }
}
