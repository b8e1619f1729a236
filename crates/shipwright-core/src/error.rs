//! Error taxonomy shared by every shipwright component.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while reading the manifest or talking to the release host.
///
/// Every variant is terminal for the current run. Callers propagate them
/// unchanged; the coordinator only attaches the stage that failed.
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// The manifest is not valid TOML.
    #[error("failed to parse manifest: {0}")]
    Parse(String),

    /// A required key path is absent (or not a non-empty string).
    #[error("manifest field `{path}` not found")]
    MissingField { path: String },

    /// The credential could not be bound to the client.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The host answered with a non-success status.
    #[error("host rejected request ({status}): {detail}")]
    Host { status: u16, detail: String },

    /// The tag for the declared version has already been released.
    #[error(
        "conflict: git tag '{tag}' already exists and matches the declared version in Cargo.toml ({version})"
    )]
    VersionConflict { tag: String, version: String },

    /// The host refused to create the release because the tag exists there.
    #[error("release for tag '{tag}' already exists on the host: {detail}")]
    ReleaseConflict { tag: String, detail: String },

    /// Local file access failed.
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An external tool (container engine, cargo) failed.
    #[error("command `{command}` failed: {detail}")]
    Command { command: String, detail: String },

    /// The pipeline configuration is incomplete or inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ReleaseError {
    /// Wrap an `std::io::Error` together with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReleaseError::Io {
            path: path.into(),
            source,
        }
    }
}

/// `err` followed by every error in its source chain, joined with `": "`.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut detail = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        detail.push_str(": ");
        detail.push_str(&cause.to_string());
        source = cause.source();
    }
    detail
}

impl From<reqwest::Error> for ReleaseError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => ReleaseError::Host {
                status: status.as_u16(),
                detail: error_chain(&err),
            },
            None => ReleaseError::Network(error_chain(&err)),
        }
    }
}

impl From<toml::de::Error> for ReleaseError {
    fn from(err: toml::de::Error) -> Self {
        ReleaseError::Parse(err.to_string())
    }
}

/// Result type for shipwright operations.
pub type Result<T, E = ReleaseError> = std::result::Result<T, E>;
