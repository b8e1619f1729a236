//! Container image references and OCI labels.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// `registry/repository:tag` triple pointing at one image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    pub fn new(registry: &str, repository: &str, tag: &str) -> Self {
        Self {
            registry: registry.to_string(),
            repository: repository.to_string(),
            tag: tag.to_string(),
        }
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

/// An image pushed to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedImage {
    pub reference: ImageReference,
    /// Content digest (`repo@sha256:...`), when the engine could report one.
    pub digest: Option<String>,
}

/// OCI labels stamped onto the runtime image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageLabels {
    pub source: String,
    pub created: String,
    pub version: Option<String>,
}

impl ImageLabels {
    pub fn new(source: &str, created: DateTime<Utc>) -> Self {
        Self {
            source: source.to_string(),
            created: created.to_rfc3339_opts(SecondsFormat::Secs, true),
            version: None,
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    /// `(key, value)` pairs in a stable order.
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("org.opencontainers.image.source", self.source.clone()),
            ("org.opencontainers.image.created", self.created.clone()),
        ];
        if let Some(version) = &self.version {
            pairs.push(("org.opencontainers.image.version", version.clone()));
        }
        pairs
    }
}
