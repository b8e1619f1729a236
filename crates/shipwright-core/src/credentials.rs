//! Opaque secret handles.

use crate::error::{ReleaseError, Result};

/// A credential that never appears in logs or debug output.
///
/// Constructed once and moved into the client that needs it.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    /// Read a secret from an environment variable.
    pub fn from_env(var: &str) -> Result<Self> {
        std::env::var(var)
            .map(Secret)
            .map_err(|_| ReleaseError::Auth(format!("environment variable {var} is not set")))
    }

    /// Plaintext with incidental surrounding whitespace removed.
    ///
    /// Fails with [`ReleaseError::Auth`] if nothing is left.
    pub fn expose_trimmed(&self) -> Result<&str> {
        let trimmed = self.0.trim();
        if trimmed.is_empty() {
            return Err(ReleaseError::Auth("credential is empty".to_string()));
        }
        Ok(trimmed)
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}
