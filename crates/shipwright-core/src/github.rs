//! GitHub implementation of [`ReleaseHost`].

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, LINK};
use reqwest::{RequestBuilder, Response, Url};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, Level};

use crate::config::ReleaseConfig;
use crate::credentials::Secret;
use crate::error::{error_chain, ReleaseError, Result};
use crate::host::{
    asset_file_name, CreatedRelease, NewRelease, ReleaseHost, TagPage, UploadedAsset,
    TAGS_PER_PAGE,
};

const USER_AGENT: &str = concat!("shipwright/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

/// Authenticated client for one GitHub repository.
///
/// The bearer token is bound once at construction; there is no way to swap
/// it afterwards.
#[derive(Debug)]
pub struct GitHubClient {
    http: reqwest::Client,
    config: ReleaseConfig,
}

impl GitHubClient {
    /// Bind `token` to a new client for the repository named in `config`.
    ///
    /// Surrounding whitespace in the token is ignored. Fails with
    /// [`ReleaseError::Auth`] if the token is blank or cannot be sent as a
    /// header.
    #[instrument(
        skip_all,
        fields(owner = %config.owner, repo = %config.repo),
        err(level = Level::DEBUG)
    )]
    pub fn authenticate(config: &ReleaseConfig, token: Secret) -> Result<Self> {
        let token = token.expose_trimmed()?;
        let mut bearer = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            ReleaseError::Auth("token contains characters not allowed in a header".to_string())
        })?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| ReleaseError::Auth(e.to_string()))?;

        debug!(api_url = %config.api_url, "created github client");

        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    fn repo_url(&self, base: &str, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            base.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            path
        )
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| ReleaseError::Network(error_chain(&e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = response
            .text()
            .await
            .unwrap_or_else(|e| format!("<unreadable response body: {}>", error_chain(&e)));
        debug!(status = status.as_u16(), %detail, "github rejected request");
        Err(ReleaseError::Host {
            status: status.as_u16(),
            detail,
        })
    }
}

#[async_trait]
impl ReleaseHost for GitHubClient {
    #[instrument(skip(self), err(level = Level::DEBUG))]
    async fn tag_page(&self, page: u32) -> Result<TagPage> {
        let request = self.http.get(self.repo_url(&self.config.api_url, "tags")).query(&[
            ("per_page", TAGS_PER_PAGE.to_string()),
            ("page", page.to_string()),
        ]);
        let response = self.send(request).await?;

        let next_page = response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .and_then(next_page_from_link);

        let entries: Vec<TagEntry> = response.json().await?;
        Ok(TagPage {
            tags: entries.into_iter().map(|entry| entry.name).collect(),
            next_page,
        })
    }

    #[instrument(skip(self), err(level = Level::DEBUG))]
    async fn create_release(&self, tag: &str) -> Result<CreatedRelease> {
        let body = NewRelease::latest(
            tag,
            &self.config.main_branch,
            &self.config.release_name(tag),
        );
        let request = self
            .http
            .post(self.repo_url(&self.config.api_url, "releases"))
            .json(&body);

        let release: CreatedRelease = match self.send(request).await {
            Ok(response) => response.json().await?,
            Err(ReleaseError::Host {
                status: 422,
                detail,
            }) if detail.contains("already_exists") => {
                return Err(ReleaseError::ReleaseConflict {
                    tag: tag.to_string(),
                    detail,
                });
            }
            Err(err) => return Err(err),
        };

        info!(id = release.id, tag = %release.tag_name, url = %release.html_url, "created release");
        Ok(release)
    }

    #[instrument(skip(self, path), fields(path = %path.display()), err(level = Level::DEBUG))]
    async fn upload_asset(&self, release_id: u64, path: &Path) -> Result<UploadedAsset> {
        let name = asset_file_name(path)?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ReleaseError::io(path, e))?;
        let sha256 = hex::encode(Sha256::digest(&bytes));

        let request = self
            .http
            .post(self.repo_url(
                &self.config.uploads_url,
                &format!("releases/{release_id}/assets"),
            ))
            .query(&[("name", name.as_str())])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes);

        let mut asset: UploadedAsset = self.send(request).await?.json().await?;
        asset.sha256 = sha256;

        info!(
            id = asset.id,
            name = %asset.name,
            size = asset.size,
            sha256 = %asset.sha256,
            "uploaded release asset"
        );
        Ok(asset)
    }
}

/// Page number of the `rel="next"` entry of an RFC 8288 `Link` header.
pub fn next_page_from_link(link: &str) -> Option<u32> {
    link.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        if !parts.any(|param| param.trim() == r#"rel="next""#) {
            return None;
        }
        let url = Url::parse(target.trim_start_matches('<').trim_end_matches('>')).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "page")
            .and_then(|(_, value)| value.parse().ok())
    })
}
