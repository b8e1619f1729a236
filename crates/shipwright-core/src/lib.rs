//! shipwright core
//!
//! Building blocks of the release pipeline that do not depend on a build
//! toolchain:
//! - reading the declared version from `Cargo.toml`
//! - deciding whether that version was already released
//! - the GitHub release/tag client and its in-memory fake
//! - configuration, credentials and tracing setup

pub mod config;
pub mod conflict;
pub mod credentials;
pub mod error;
pub mod fakes;
pub mod github;
pub mod host;
pub mod image;
pub mod manifest;
pub mod telemetry;

pub use config::ReleaseConfig;
pub use conflict::check_version_conflict;
pub use credentials::Secret;
pub use error::{ReleaseError, Result};
pub use github::GitHubClient;
pub use host::{
    collect_tags, tag_pages, CreatedRelease, NewRelease, ReleaseHost, TagPage, UploadedAsset,
};
pub use image::{ImageLabels, ImageReference, PublishedImage};
pub use manifest::{read_package_name, read_version, read_version_file, Version};
pub use telemetry::init_tracing;
