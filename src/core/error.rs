//! Error types for app configs and process control

use std::path::PathBuf;

use thiserror::Error;

/// An app config that could not be loaded, created or saved
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("program not found: {}", .0.display())]
    ProgramNotFound(PathBuf),

    #[error("unknown day of week: {0:?}")]
    UnknownDay(String),

    #[error("invalid {field}: {value:?}")]
    InvalidTime { field: &'static str, value: String },

    #[error("the name {0:?} is already in use")]
    NameTaken(String),

    #[error("invalid app name: {0:?}")]
    InvalidName(String),
}

/// Contract violations and OS failures while driving a child process
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("process is already running")]
    AlreadyRunning,

    #[error("process is not running")]
    NotRunning,

    #[error("process handle already finished; start a new one")]
    Finished,

    #[error("failed to spawn {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no async runtime to supervise the process on")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("failed to signal process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}
