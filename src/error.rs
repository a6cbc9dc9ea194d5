use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A lifecycle instance reused a suffix already registered in this run.
    #[error("Instance already registered: operation '{name}' exists")]
    DuplicateInstance { name: String },

    #[error("Operation already registered: {name}")]
    DuplicateOperation { name: String },

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Failed to start node: {0}")]
    ProcessStart(String),

    #[error("Failed to stop node: {0}")]
    ProcessStop(String),

    #[error("Failed to remove {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation '{name}' failed: {source}")]
    OperationFailed {
        name: String,
        #[source]
        source: Box<Error>,
    },

    /// Failure carried over from an earlier run of the same scheduler.
    #[error("{0}")]
    PriorFailure(String),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("No home directory")]
    NoHomeDir,
}

pub type Result<T> = std::result::Result<T, Error>;
