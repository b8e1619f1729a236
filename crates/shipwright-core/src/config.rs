//! Pipeline configuration.
//!
//! Values come from built-in defaults, then `SHIPWRIGHT_*` environment
//! variables, then whatever the caller overrides (usually CLI flags).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ReleaseError, Result};
use crate::image::ImageReference;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_UPLOADS_URL: &str = "https://uploads.github.com";
pub const DEFAULT_REGISTRY: &str = "ghcr.io";
pub const DEFAULT_TARGET: &str = "x86_64-unknown-linux-musl";

/// Everything the pipeline needs to know about where to release to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseConfig {
    /// Repository owner on the VCS host.
    pub owner: String,
    /// Repository name on the VCS host.
    pub repo: String,
    /// Product name used for the binary, release name and asset name.
    /// Empty means "use `package.name` from the manifest".
    pub product: String,
    /// Branch the release tag is cut from.
    pub main_branch: String,
    /// Container registry host.
    pub registry: String,
    /// Image repository inside the registry. Empty means `owner/repo`.
    pub image_repository: String,
    /// Manifest path relative to the source tree.
    pub manifest_path: PathBuf,
    /// Rust target triple of the released binary.
    pub target: String,
    /// GitHub REST API base URL.
    pub api_url: String,
    /// GitHub asset upload base URL.
    pub uploads_url: String,
    /// Container engine executable (`docker`, `podman`).
    pub engine: String,
    /// Image the binary is compiled in.
    pub builder_image: String,
    /// Image the runtime filesystem (users, CA certificates) is taken from.
    pub base_image: String,
    /// Directory the exported binary is written to.
    pub output_dir: PathBuf,
    /// Timeout for each external command, in seconds. 0 disables it.
    pub timeout_secs: u64,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        ReleaseConfig {
            owner: String::new(),
            repo: String::new(),
            product: String::new(),
            main_branch: "main".to_string(),
            registry: DEFAULT_REGISTRY.to_string(),
            image_repository: String::new(),
            manifest_path: PathBuf::from("Cargo.toml"),
            target: DEFAULT_TARGET.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            uploads_url: DEFAULT_UPLOADS_URL.to_string(),
            engine: "docker".to_string(),
            builder_image: "rust:1.88-alpine".to_string(),
            base_image: "alpine:latest".to_string(),
            output_dir: PathBuf::from("."),
            timeout_secs: 0,
        }
    }
}

impl ReleaseConfig {
    /// Config for a specific repository, everything else defaulted.
    pub fn new(owner: &str, repo: &str) -> Self {
        ReleaseConfig {
            owner: owner.to_string(),
            repo: repo.to_string(),
            ..Self::default()
        }
    }

    /// Defaults overlaid with `SHIPWRIGHT_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let env = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());

        if let Some(v) = env("SHIPWRIGHT_OWNER") {
            config.owner = v;
        }
        if let Some(v) = env("SHIPWRIGHT_REPO") {
            config.repo = v;
        }
        if let Some(v) = env("SHIPWRIGHT_PRODUCT") {
            config.product = v;
        }
        if let Some(v) = env("SHIPWRIGHT_MAIN_BRANCH") {
            config.main_branch = v;
        }
        if let Some(v) = env("SHIPWRIGHT_REGISTRY") {
            config.registry = v;
        }
        if let Some(v) = env("SHIPWRIGHT_IMAGE") {
            config.image_repository = v;
        }
        if let Some(v) = env("SHIPWRIGHT_TARGET") {
            config.target = v;
        }
        if let Some(v) = env("SHIPWRIGHT_API_URL") {
            config.api_url = v;
        }
        if let Some(v) = env("SHIPWRIGHT_UPLOADS_URL") {
            config.uploads_url = v;
        }
        if let Some(v) = env("SHIPWRIGHT_ENGINE") {
            config.engine = v;
        }
        if let Some(v) = env("SHIPWRIGHT_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            config.timeout_secs = v;
        }
        config
    }

    pub fn with_product(mut self, product: &str) -> Self {
        self.product = product.to_string();
        self
    }

    pub fn with_api_urls(mut self, api_url: &str, uploads_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self.uploads_url = uploads_url.trim_end_matches('/').to_string();
        self
    }

    /// Check that every field the host and registry need is filled in.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("owner", &self.owner),
            ("repo", &self.repo),
            ("product", &self.product),
            ("main_branch", &self.main_branch),
            ("registry", &self.registry),
            ("target", &self.target),
            ("engine", &self.engine),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ReleaseError::Config(format!("`{name}` must not be empty")));
            }
        }
        if self.owner.contains('/') || self.repo.contains('/') {
            return Err(ReleaseError::Config(
                "`owner` and `repo` must be single path segments".to_string(),
            ));
        }
        Ok(())
    }

    /// Release display name: `"<product>-<tag>"`.
    pub fn release_name(&self, tag: &str) -> String {
        format!("{}-{}", self.product, tag)
    }

    /// File name of the exported binary and of the release asset.
    pub fn asset_name(&self) -> String {
        format!("{}-{}", self.product, self.target)
    }

    /// Where the exported binary lands on local storage.
    pub fn asset_path(&self) -> PathBuf {
        self.output_dir.join(self.asset_name())
    }

    /// Public URL of the source repository, used as an image label.
    pub fn source_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.repo)
    }

    pub fn image_repository(&self) -> String {
        if self.image_repository.is_empty() {
            format!("{}/{}", self.owner, self.repo).to_lowercase()
        } else {
            self.image_repository.clone()
        }
    }

    pub fn image_reference(&self, tag: &str) -> ImageReference {
        ImageReference::new(&self.registry, &self.image_repository(), tag)
    }
}
