use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("Scan error: {0}")]
    Scan(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Outcome of a single failed file mutation.
///
/// `Collision` is not terminal: a toggle that collides can be retried with
/// merge semantics. Every other variant is recorded against the file and the
/// batch moves on.
#[derive(Error, Debug)]
pub enum MutationError {
    #[error("destination already exists: {path}")]
    Collision { path: String },

    #[error("file not found: {path}")]
    NotFound { path: String },

    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    #[error("invalid target '{path}': {reason}")]
    InvalidTarget { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MutationError {
    pub fn is_collision(&self) -> bool {
        matches!(self, MutationError::Collision { .. })
    }

    /// Classify an IO error raised while touching `path`.
    pub fn from_io(path: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => MutationError::NotFound {
                path: path.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => MutationError::PermissionDenied {
                path: path.to_string(),
            },
            std::io::ErrorKind::AlreadyExists => MutationError::Collision {
                path: path.to_string(),
            },
            _ => MutationError::Io(err),
        }
    }
}
