use std::path::PathBuf;
use std::process::ExitStatus;

use connx_ir::{ParseError, ValidationError};

/// Error type of the backend operations.
#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("Invalid model: {0}")]
    Validation(#[from] ValidationError),

    #[error("Cannot find connx in paths: {candidates:?}")]
    RuntimeNotFound { candidates: Vec<String> },

    #[error("Compilation failed: {0}")]
    Compilation(#[from] CompileError),

    #[error("Execution failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Node has {expected} inputs but {actual} tensors were supplied")]
    InputCountMismatch { expected: usize, actual: usize },

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised by a [`Compiler`](crate::Compiler).
#[derive(thiserror::Error, Debug)]
pub enum CompileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot encode model: {0}")]
    Encode(#[from] ParseError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("other error: {0}")]
    Other(String),
}

/// Error raised while running a prepared artifact.
#[derive(thiserror::Error, Debug)]
pub enum ExecutionError {
    #[error("Cannot start runtime {path}: {source}")]
    Spawn {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Runtime exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("Unreadable manifest in {dir}: {source}")]
    InvalidManifest { dir: PathBuf, source: CompileError },

    #[error("Runtime produced no output file {0}")]
    MissingOutput(PathBuf),

    #[error("Malformed output {path}: {source}")]
    MalformedOutput { path: PathBuf, source: ParseError },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration IO error.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid format: {0}")]
    InvalidFormat(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
