//! Release Registry Client abstraction.
//!
//! [`ReleaseHost`] is the capability surface the coordinator needs from the
//! version-control host: page through tags, create a release, attach an
//! asset. [`crate::github::GitHubClient`] talks to GitHub; the in-memory
//! [`crate::fakes::MemoryReleaseHost`] backs the tests.

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use futures::stream::{self, Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ReleaseError, Result};

/// Tags requested per page.
pub const TAGS_PER_PAGE: usize = 100;

/// One page of the tag listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagPage {
    pub tags: Vec<String>,
    /// Page number to request next, `None` once the listing is exhausted.
    pub next_page: Option<u32>,
}

/// Body of a release-creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRelease {
    pub tag_name: String,
    pub target_commitish: String,
    pub name: String,
    pub draft: bool,
    pub prerelease: bool,
    /// GitHub expects the string `"true"`, `"false"` or `"legacy"`.
    pub make_latest: String,
    pub generate_release_notes: bool,
}

impl NewRelease {
    /// A published, non-prerelease release marked as latest with generated notes.
    pub fn latest(tag: &str, target_commitish: &str, name: &str) -> Self {
        Self {
            tag_name: tag.to_string(),
            target_commitish: target_commitish.to_string(),
            name: name.to_string(),
            draft: false,
            prerelease: false,
            make_latest: "true".to_string(),
            generate_release_notes: true,
        }
    }
}

/// Identity of a release once the host has created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRelease {
    pub id: u64,
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub html_url: String,
}

/// An asset attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedAsset {
    pub id: u64,
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub browser_download_url: String,
    /// SHA-256 of the uploaded bytes, computed locally.
    #[serde(default)]
    pub sha256: String,
}

/// Operations against the version-control host, scoped to one repository.
#[async_trait]
pub trait ReleaseHost: Send + Sync {
    /// Fetch one page (1-based) of tag names.
    async fn tag_page(&self, page: u32) -> Result<TagPage>;

    /// Create a release for `tag`.
    async fn create_release(&self, tag: &str) -> Result<CreatedRelease>;

    /// Read the file at `path` and attach it to release `release_id`,
    /// named after the file's base name.
    async fn upload_asset(&self, release_id: u64, path: &Path) -> Result<UploadedAsset>;

    /// Every tag known to the host, following pagination to the end.
    async fn list_tags(&self) -> Result<BTreeSet<String>> {
        collect_tags(self).await
    }
}

/// Lazy sequence of tag pages, requested in order starting at page 1 and
/// ending when the host reports no next page.
pub fn tag_pages<H>(host: &H) -> impl Stream<Item = Result<Vec<String>>> + Send + '_
where
    H: ReleaseHost + ?Sized,
{
    stream::try_unfold(Some(1u32), move |next| async move {
        let Some(page) = next else {
            return Ok(None);
        };
        let TagPage { tags, next_page } = host.tag_page(page).await?;
        debug!(page, count = tags.len(), ?next_page, "fetched tag page");
        Ok::<_, ReleaseError>(Some((tags, next_page)))
    })
}

/// Drain [`tag_pages`] into one set. The first failing page discards
/// everything gathered so far.
pub async fn collect_tags<H>(host: &H) -> Result<BTreeSet<String>>
where
    H: ReleaseHost + ?Sized,
{
    tag_pages(host)
        .try_fold(BTreeSet::new(), |mut all, page| async move {
            all.extend(page);
            Ok::<_, ReleaseError>(all)
        })
        .await
}

/// File name used as the asset name for `path`.
pub fn asset_file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            ReleaseError::io(
                path,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "asset path has no usable file name",
                ),
            )
        })
}
