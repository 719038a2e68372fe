use std::path::PathBuf;

/// Errors that can occur in the extension system.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Extension manifest file not found at the expected location.
    #[error("extension manifest not found: {0}")]
    ManifestNotFound(String),

    /// Failed to parse extension manifest JSON.
    #[error("failed to parse extension manifest at {location}: {source}")]
    ManifestParse {
        location: String,
        source: serde_json::Error,
    },

    /// The manifest parsed but is not a JSON object.
    #[error("extension manifest at {location} must be a JSON object")]
    ManifestNotObject { location: String },

    /// Invalid version string.
    #[error("invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    /// Failed to parse a version constraint.
    #[error("invalid version constraint '{constraint}': {reason}")]
    VersionConstraintParse { constraint: String, reason: String },

    /// A manifest section could not be bound to the requested options type.
    #[error("failed to bind section '{section}' of extension '{extension}': {source}")]
    OptionsBind {
        extension: String,
        section: String,
        source: serde_json::Error,
    },

    /// Options could not be merged into the target value.
    #[error("failed to merge options for section '{section}': {source}")]
    OptionsMerge {
        section: String,
        source: serde_json::Error,
    },

    /// A `key=value` override was malformed.
    #[error("invalid option override '{0}': expected key=value")]
    InvalidOptionOverride(String),

    /// Failed to read an extension archive.
    #[error("failed to read extension archive {path}: {source}")]
    Archive {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    /// Failed to serialize persisted extension sources.
    #[error("failed to serialize extension sources: {0}")]
    SourcesSerialize(serde_json::Error),

    /// Persisting a file failed.
    #[error(transparent)]
    Fs(#[from] upgrade_fs::Error),

    /// Extension not found in the registry.
    #[error("unknown extension: {0}")]
    UnknownExtension(String),

    /// I/O error reading or writing extension files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
