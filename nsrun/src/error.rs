//! Crate-wide error type.
//!
//! One `thiserror` enum covering every error kind from the design's error
//! taxonomy: user input, already-exists, not-found, and the various kernel /
//! subprocess failure modes. Kept flat rather than nested per-module so the
//! CLI can map it to an exit code in one place.

use std::path::PathBuf;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("{0}")]
    UserInput(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    NotFound(String),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cgroup controller `{controller}` not mounted")]
    CgroupControllerMissing { controller: &'static str },

    #[error("kernel call `{call}` failed: {source}")]
    Kernel {
        call: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("netlink operation failed: {0}")]
    Netlink(String),

    #[error("external command `{command}` failed: {detail}")]
    Subprocess { command: &'static str, detail: String },

    #[error("{0}")]
    Serde(#[from] serde_json::Error),
}

impl RuntimeError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RuntimeError::Io { path: path.into(), source }
    }

    pub fn kernel(call: &'static str, source: nix::Error) -> Self {
        RuntimeError::Kernel { call, source }
    }

    /// Exit code the CLI should use for this error, per the design's error
    /// taxonomy: user-facing mistakes are 1, everything else (kernel /
    /// subprocess / IO) is 2.
    pub fn exit_code(&self) -> i32 {
        match self {
            RuntimeError::UserInput(_)
            | RuntimeError::AlreadyExists(_)
            | RuntimeError::NotFound(_) => 1,
            _ => 2,
        }
    }
}
