/// Error types for the rotator
///
/// Every adapter call returns `Result<T>`; whether a failure is fatal or
/// only logged is decided by `policy::disposition`, not here.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, RotatorError>;

#[derive(Debug, Error)]
pub enum RotatorError {
    /// Filesystem operation failed on a known path
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// External program could not be started at all
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// External program ran but exited unsuccessfully
    #[error("{program} {args} exited with {}: {stderr}", .code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    CommandFailed {
        program: String,
        args: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Backing image could not be allocated or formatted
    #[error("failed to provision image {index}: {detail}")]
    Provision { index: u8, detail: String },

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file is not valid JSON
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// Drain journal database error
    #[error("journal error: {0}")]
    Journal(#[from] rusqlite::Error),

    /// A blocking task panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Role bookkeeping reached a state that must never happen
    #[error("rotation invariant violated: {0}")]
    Invariant(String),
}

impl RotatorError {
    /// Wrap an `std::io::Error` with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RotatorError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Attach a path to `std::io::Result`s, like `anyhow::Context` does for messages
pub trait IoContext<T> {
    fn at_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| RotatorError::io(path, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_message() {
        let err = RotatorError::CommandFailed {
            program: "modprobe".into(),
            args: "-r g_mass_storage".into(),
            code: Some(1),
            stderr: "module in use".into(),
        };
        assert_eq!(
            err.to_string(),
            "modprobe -r g_mass_storage exited with 1: module in use"
        );
    }

    #[test]
    fn test_io_context_keeps_path() {
        let result: std::io::Result<()> = Err(std::io::Error::from(std::io::ErrorKind::NotFound));
        let err = result.at_path("/mnt/teslacam").unwrap_err();
        assert!(err.to_string().starts_with("I/O error on /mnt/teslacam"));
    }
}
