//! Version Reader: extracts the declared release version from `Cargo.toml`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ReleaseError, Result};

/// Key path of the release version inside the manifest.
pub const VERSION_KEY: &str = "package.version";

/// Key path of the package name inside the manifest.
pub const NAME_KEY: &str = "package.name";

/// Release version as declared in the manifest.
///
/// Always non-empty; the text is kept exactly as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct Version(String);

impl Version {
    /// Wrap a raw version string. Empty strings are rejected.
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ReleaseError::MissingField {
                path: VERSION_KEY.to_string(),
            });
        }
        Ok(Version(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The git tag that marks this version: `"v" + version`.
    pub fn tag(&self) -> String {
        format!("v{}", self.0)
    }
}

impl TryFrom<String> for Version {
    type Error = ReleaseError;

    fn try_from(raw: String) -> Result<Self> {
        Version::new(raw)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read `package.version` from raw manifest text.
pub fn read_version(manifest: &str) -> Result<Version> {
    let raw = read_string(manifest, VERSION_KEY)?;
    let version = Version::new(raw)?;
    debug!(%version, "read manifest version");
    Ok(version)
}

/// Read `package.name` from raw manifest text.
pub fn read_package_name(manifest: &str) -> Result<String> {
    read_string(manifest, NAME_KEY)
}

/// Read the manifest at `path` and extract its version.
pub async fn read_version_file(path: &Path) -> Result<Version> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ReleaseError::io(path, e))?;
    read_version(&text)
}

fn read_string(manifest: &str, key_path: &str) -> Result<String> {
    let table: toml::Table = toml::from_str(manifest)?;

    let mut segments = key_path.split('.');
    let first = segments.next().unwrap_or_default();
    let mut current = table.get(first);
    for segment in segments {
        current = current.and_then(|value| value.get(segment));
    }

    match current.and_then(toml::Value::as_str) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(ReleaseError::MissingField {
            path: key_path.to_string(),
        }),
    }
}
