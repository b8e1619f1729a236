//! In-memory fake of the release host (testing only).
//!
//! `MemoryReleaseHost` paginates, creates releases and stores assets the way
//! the real host does, records every call it receives, and can be told to
//! fail at a chosen point.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{ReleaseError, Result};
use crate::host::{
    asset_file_name, CreatedRelease, ReleaseHost, TagPage, UploadedAsset, TAGS_PER_PAGE,
};

/// A call received by [`MemoryReleaseHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    TagPage(u32),
    CreateRelease(String),
    UploadAsset { release_id: u64, name: String },
}

#[derive(Debug, Default)]
struct HostState {
    tags: Vec<String>,
    releases: Vec<CreatedRelease>,
    assets: Vec<(u64, UploadedAsset)>,
    calls: Vec<HostCall>,
}

/// In-memory release host backed by vectors behind a mutex.
#[derive(Debug)]
pub struct MemoryReleaseHost {
    state: Mutex<HostState>,
    page_size: usize,
    fail_on_page: Option<u32>,
    fail_create: bool,
    fail_upload: bool,
}

impl Default for MemoryReleaseHost {
    fn default() -> Self {
        Self {
            state: Mutex::new(HostState::default()),
            page_size: TAGS_PER_PAGE,
            fail_on_page: None,
            fail_create: false,
            fail_upload: false,
        }
    }
}

impl MemoryReleaseHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host that already knows `tags`.
    pub fn with_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let host = Self::default();
        host.lock().tags = tags.into_iter().map(Into::into).collect();
        host
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Answer requests for `page` with a 502.
    pub fn failing_on_page(mut self, page: u32) -> Self {
        self.fail_on_page = Some(page);
        self
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.lock().calls.clone()
    }

    pub fn releases(&self) -> Vec<CreatedRelease> {
        self.lock().releases.clone()
    }

    pub fn assets(&self, release_id: u64) -> Vec<UploadedAsset> {
        self.lock()
            .assets
            .iter()
            .filter(|(id, _)| *id == release_id)
            .map(|(_, asset)| asset.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ReleaseHost for MemoryReleaseHost {
    async fn tag_page(&self, page: u32) -> Result<TagPage> {
        let mut state = self.lock();
        state.calls.push(HostCall::TagPage(page));

        if self.fail_on_page == Some(page) {
            return Err(ReleaseError::Host {
                status: 502,
                detail: format!("bad gateway on page {page}"),
            });
        }

        let start = (page.max(1) as usize - 1) * self.page_size;
        let end = (start + self.page_size).min(state.tags.len());
        let tags = state.tags.get(start..end).unwrap_or_default().to_vec();
        let next_page = (end < state.tags.len()).then_some(page + 1);

        Ok(TagPage { tags, next_page })
    }

    async fn create_release(&self, tag: &str) -> Result<CreatedRelease> {
        let mut state = self.lock();
        state.calls.push(HostCall::CreateRelease(tag.to_string()));

        if self.fail_create {
            return Err(ReleaseError::Host {
                status: 500,
                detail: "release creation failed".to_string(),
            });
        }
        if state.releases.iter().any(|r| r.tag_name == tag) {
            return Err(ReleaseError::ReleaseConflict {
                tag: tag.to_string(),
                detail: "already_exists".to_string(),
            });
        }

        let release = CreatedRelease {
            id: state.releases.len() as u64 + 1,
            tag_name: tag.to_string(),
            name: None,
            html_url: format!("https://example.invalid/releases/tag/{tag}"),
        };
        state.releases.push(release.clone());
        if !state.tags.iter().any(|t| t == tag) {
            state.tags.push(tag.to_string());
        }
        Ok(release)
    }

    async fn upload_asset(&self, release_id: u64, path: &Path) -> Result<UploadedAsset> {
        let name = asset_file_name(path)?;
        self.lock().calls.push(HostCall::UploadAsset {
            release_id,
            name: name.clone(),
        });

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ReleaseError::io(path, e))?;

        if self.fail_upload {
            return Err(ReleaseError::Host {
                status: 500,
                detail: "asset upload failed".to_string(),
            });
        }

        let mut state = self.lock();
        if !state.releases.iter().any(|r| r.id == release_id) {
            return Err(ReleaseError::Host {
                status: 404,
                detail: format!("release {release_id} not found"),
            });
        }

        let asset = UploadedAsset {
            id: state.assets.len() as u64 + 1,
            name,
            size: bytes.len() as u64,
            browser_download_url: String::new(),
            sha256: hex::encode(Sha256::digest(&bytes)),
        };
        state.assets.push((release_id, asset.clone()));
        Ok(asset)
    }
}
