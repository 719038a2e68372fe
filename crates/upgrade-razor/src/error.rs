//! Error types for upgrade-razor

use std::path::PathBuf;

/// Result type for upgrade-razor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while applying replacements to templates
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Fs(#[from] upgrade_fs::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
