//! Unified error type hierarchy for rootmod
//!
//! Provides structured error handling with ShellError, ModuleError and ConfigError.
//! None of these cross the manager boundary: the manager folds them into
//! `OperationResult`, `InstallOutcome` or sentinel values.

use std::io;
use thiserror::Error;

/// Privileged shell acquisition and job execution errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShellError {
    #[error("Failed to spawn shell '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Shell is not running as root (uid {0})")]
    NotRoot(String),

    #[error("Shell exited unexpectedly")]
    ShellDied,

    #[error("Shell worker is gone")]
    WorkerGone,

    #[error("I/O error talking to shell: {0}")]
    Io(String),
}

impl From<io::Error> for ShellError {
    fn from(e: io::Error) -> Self {
        ShellError::Io(e.to_string())
    }
}

/// Module discovery and lifecycle errors.
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Invalid module id: {0}")]
    InvalidId(String),

    #[error("Module directory not found: {0}")]
    DirectoryMissing(String),

    #[error("Invalid archive path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Archive read failed: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Shell(#[from] ShellError),
}

/// Settings file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid JSON in config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

/// Top-level result type for operations that may fail.
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
