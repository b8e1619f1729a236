//! Artifact Builder: compiled binary and runtime image.

use std::path::{Path, PathBuf};

use chrono::Utc;
use shipwright_core::{ImageLabels, ReleaseConfig, Result};
use tracing::info;

use crate::dockerfile::{self, BuildTarget};
use crate::engine::{BuildRequest, BuiltImage, ContainerEngine};

/// Produces the release binary and runtime image through a [`ContainerEngine`].
pub struct ArtifactBuilder<'a> {
    config: &'a ReleaseConfig,
    engine: &'a dyn ContainerEngine,
}

impl<'a> ArtifactBuilder<'a> {
    pub fn new(config: &'a ReleaseConfig, engine: &'a dyn ContainerEngine) -> Self {
        Self { config, engine }
    }

    fn request(&self, source: &Path, target: BuildTarget, labels: ImageLabels) -> BuildRequest {
        BuildRequest {
            context: source.to_path_buf(),
            dockerfile: dockerfile::render(self.config),
            target,
            labels,
        }
    }

    /// Labels every image gets: source repository and creation time.
    pub fn base_labels(&self) -> ImageLabels {
        ImageLabels::new(&self.config.source_url(), Utc::now())
    }

    /// Compile the binary and export it to [`ReleaseConfig::asset_path`].
    pub async fn compile_binary(&self, source: &Path) -> Result<PathBuf> {
        let request = self.request(source, BuildTarget::Builder, self.base_labels());
        let image = self.engine.build(&request).await?;
        self.export_binary(&image).await
    }

    /// Build the runtime image carrying the compiled binary.
    pub async fn build_runtime_image(
        &self,
        source: &Path,
        labels: ImageLabels,
    ) -> Result<BuiltImage> {
        let request = self.request(source, BuildTarget::Runtime, labels);
        let image = self.engine.build(&request).await?;
        info!(image = %image.id, version = ?image.labels.version, "runtime image ready");
        Ok(image)
    }

    /// Copy the binary out of `image` to local storage.
    pub async fn export_binary(&self, image: &BuiltImage) -> Result<PathBuf> {
        let dest = self.config.asset_path();
        let path = self
            .engine
            .export_file(image, &dockerfile::binary_path(self.config), &dest)
            .await?;
        info!(path = %path.display(), "exported binary");
        Ok(path)
    }
}
