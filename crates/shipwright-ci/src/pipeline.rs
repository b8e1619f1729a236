//! Release Coordinator.
//!
//! A release is a fixed sequence of named stages. Each stage runs only after
//! the previous one finished, and the first failure ends the run with a
//! [`PipelineError`] naming the stage. Nothing is retried or rolled back:
//! a release created before a failed upload stays on the host, and a
//! `latest` tag pushed before a failed version push stays in the registry.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use shipwright_core::{
    check_version_conflict, read_version_file, CreatedRelease, PublishedImage, ReleaseConfig,
    ReleaseError, ReleaseHost, UploadedAsset, Version,
};
use tracing::{error, info, warn};

use crate::builder::ArtifactBuilder;
use crate::engine::{BuiltImage, ContainerEngine, RegistryAuth};

/// Tag that always follows the newest release.
pub const LATEST_TAG: &str = "latest";

/// Stages of a release, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ConflictCheck,
    Build,
    Export,
    CreateRelease,
    UploadAsset,
    Publish,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::ConflictCheck,
        Stage::Build,
        Stage::Export,
        Stage::CreateRelease,
        Stage::UploadAsset,
        Stage::Publish,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::ConflictCheck => "conflict_check",
            Stage::Build => "build",
            Stage::Export => "export",
            Stage::CreateRelease => "create_release",
            Stage::UploadAsset => "upload_asset",
            Stage::Publish => "publish",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The first failure of a release, tagged with the stage it happened in.
#[derive(Debug, thiserror::Error)]
#[error("release failed at stage `{stage}`: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: ReleaseError,
}

/// Timing of a completed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub duration_ms: u64,
}

/// Everything a successful release produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseOutcome {
    pub version: Version,
    pub tag: String,
    pub release: CreatedRelease,
    pub asset: UploadedAsset,
    pub images: Vec<PublishedImage>,
    pub stages: Vec<StageRecord>,
}

/// Tags the runtime image is pushed under, in push order.
pub fn publish_tags(version: &Version) -> [String; 2] {
    [LATEST_TAG.to_string(), version.to_string()]
}

/// Runs stages in order and records how long each took.
#[derive(Debug, Default)]
struct StageLog {
    records: Vec<StageRecord>,
}

impl StageLog {
    async fn run<T, F>(&mut self, stage: Stage, work: F) -> Result<T, PipelineError>
    where
        F: Future<Output = shipwright_core::Result<T>>,
    {
        info!(%stage, "starting stage");
        let start = Instant::now();
        let result = work.await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(value) => {
                info!(%stage, duration_ms, "stage complete");
                self.records.push(StageRecord { stage, duration_ms });
                Ok(value)
            }
            Err(source) => {
                error!(%stage, duration_ms, error = %source, "stage failed");
                Err(PipelineError { stage, source })
            }
        }
    }
}

/// Sequences conflict check, build, export, release, upload and publish.
pub struct ReleaseCoordinator<'a> {
    config: &'a ReleaseConfig,
    host: &'a dyn ReleaseHost,
    engine: &'a dyn ContainerEngine,
}

impl<'a> ReleaseCoordinator<'a> {
    pub fn new(
        config: &'a ReleaseConfig,
        host: &'a dyn ReleaseHost,
        engine: &'a dyn ContainerEngine,
    ) -> Self {
        Self {
            config,
            host,
            engine,
        }
    }

    fn manifest_path(&self, source: &Path) -> PathBuf {
        source.join(&self.config.manifest_path)
    }

    /// Read the declared version and make sure its tag does not exist yet.
    pub async fn check_version_conflict(&self, source: &Path) -> shipwright_core::Result<Version> {
        let version = read_version_file(&self.manifest_path(source)).await?;
        let existing = self.host.list_tags().await?;
        info!(%version, existing = existing.len(), "checking version against existing tags");
        check_version_conflict(version, &existing)
    }

    /// Run the whole release.
    pub async fn release(
        &self,
        source: &Path,
        registry: &RegistryAuth,
    ) -> Result<ReleaseOutcome, PipelineError> {
        let mut log = StageLog::default();
        let builder = ArtifactBuilder::new(self.config, self.engine);

        let version = log
            .run(Stage::ConflictCheck, self.check_version_conflict(source))
            .await?;
        let tag = version.tag();
        info!(%version, %tag, "version is free");

        let image = log
            .run(Stage::Build, async {
                self.engine.login(registry).await?;
                let labels = builder.base_labels().with_version(version.as_str());
                builder.build_runtime_image(source, labels).await
            })
            .await?;

        let binary = log
            .run(Stage::Export, builder.export_binary(&image))
            .await?;

        let release = log
            .run(Stage::CreateRelease, self.host.create_release(&tag))
            .await?;

        let asset = match log
            .run(Stage::UploadAsset, self.host.upload_asset(release.id, &binary))
            .await
        {
            Ok(asset) => asset,
            Err(err) => {
                warn!(
                    release_id = release.id,
                    %tag,
                    "release was created without its asset and must be cleaned up manually"
                );
                return Err(err);
            }
        };

        let images = log
            .run(Stage::Publish, self.publish(&image, &version))
            .await?;

        info!(%version, release_id = release.id, "release complete");
        Ok(ReleaseOutcome {
            version,
            tag,
            release,
            asset,
            images,
            stages: log.records,
        })
    }

    /// Push `image` once per tag in [`publish_tags`] order, stopping at the
    /// first failure.
    async fn publish(
        &self,
        image: &BuiltImage,
        version: &Version,
    ) -> shipwright_core::Result<Vec<PublishedImage>> {
        let mut published: Vec<PublishedImage> = Vec::new();
        for tag in publish_tags(version) {
            let reference = self.config.image_reference(&tag);
            match self.engine.publish(image, &reference).await {
                Ok(pushed) => {
                    info!(
                        reference = %pushed.reference,
                        digest = ?pushed.digest,
                        "published image"
                    );
                    published.push(pushed);
                }
                Err(err) => {
                    if !published.is_empty() {
                        let done: Vec<String> =
                            published.iter().map(|p| p.reference.tag.clone()).collect();
                        warn!(failed = %reference, ?done, "image only partially published");
                    }
                    return Err(err);
                }
            }
        }
        Ok(published)
    }
}
