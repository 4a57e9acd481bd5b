//! Error types for cachepipe
//!
//! All modules use `CachePipeResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cachepipe operations
pub type CachePipeResult<T> = Result<T, CachePipeError>;

/// All errors that can occur while validating a build cache
#[derive(Error, Debug)]
pub enum CachePipeError {
    // Prerequisite errors
    #[error("Prerequisite check failed: {0}")]
    Prerequisite(String),

    #[error("Unsupported platform: {0}. cachepipe supports macOS and Linux.")]
    UnsupportedPlatform(String),

    // Transfer errors
    #[error("Transfer of {object} failed: {reason}")]
    Transfer { object: String, reason: String },

    #[error("Checksum mismatch for {object}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        object: String,
        expected: String,
        actual: String,
    },

    // Archive errors
    #[error("Reassembly of {output} failed: part {part} is missing")]
    Reassembly { output: PathBuf, part: PathBuf },

    #[error("Corrupt archive {path}{}", entries_suffix(.entries))]
    CorruptArchive {
        path: PathBuf,
        entries: Option<usize>,
    },

    #[error("Extraction of {archive} failed with exit code {code}: {stderr}")]
    Extraction {
        archive: PathBuf,
        code: i32,
        stderr: String,
    },

    // Build errors
    #[error("Build of {target} failed with exit code {code}")]
    BuildFailure {
        target: String,
        code: i32,
        tail: String,
    },

    #[error("Build of {target} timed out after {timeout_secs}s")]
    BuildTimeout { target: String, timeout_secs: u64 },

    #[error("{failed} of {total} benchmark builds failed")]
    BenchmarkFailed { failed: usize, total: usize },

    #[error("Interrupted by user")]
    Interrupted,

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

fn entries_suffix(entries: &Option<usize>) -> String {
    match entries {
        Some(n) => format!(" ({} entries readable)", n),
        None => String::new(),
    }
}

impl CachePipeError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a transfer error for a remote object
    pub fn transfer(object: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transfer {
            object: object.into(),
            reason: reason.into(),
        }
    }

    /// Tail of the captured build output, if this is a build failure
    pub fn output_tail(&self) -> Option<&str> {
        match self {
            Self::BuildFailure { tail, .. } if !tail.is_empty() => Some(tail),
            _ => None,
        }
    }

    /// Whether this error must abort the pipeline.
    ///
    /// Transfer faults are the only kind a stage may downgrade to a warning,
    /// and only for optional objects.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Transfer { .. } | Self::ChecksumMismatch { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Prerequisite(_) => Some("Run: cachepipe check"),
            Self::Transfer { .. } => Some("Check --base-url and your network connection"),
            Self::ChecksumMismatch { .. } => Some("Delete the workspace and re-run to fetch fresh copies"),
            Self::Reassembly { .. } => Some("All split parts must be fetched before reassembly"),
            Self::CorruptArchive { .. } => Some("The cache release may be incomplete; re-run the pipeline"),
            Self::BuildTimeout { .. } => Some("Raise the limit with --timeout"),
            Self::BenchmarkFailed { .. } => Some("See the build list in the report; run with -v for output"),
            _ => None,
        }
    }
}
