//! Container engine seam.
//!
//! [`ContainerEngine`] covers the four things the pipeline asks of a
//! container toolchain: authenticate to a registry, build an image, copy a
//! file out of an image and push an image under a tag. [`DockerEngine`]
//! drives the `docker` (or a compatible `podman`) CLI.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shipwright_core::{
    ImageLabels, ImageReference, PublishedImage, ReleaseError, Result, Secret,
};
use tracing::{debug, info, instrument, warn, Level};

use crate::dockerfile::BuildTarget;
use crate::runner::{CommandOutput, CommandRunner, Invocation};

/// Registry credentials handed to [`ContainerEngine::login`].
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    pub registry: String,
    pub username: String,
    pub token: Secret,
}

/// Everything needed to build one stage of the Dockerfile.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Build context (the source tree).
    pub context: PathBuf,
    /// Dockerfile contents.
    pub dockerfile: String,
    pub target: BuildTarget,
    pub labels: ImageLabels,
}

/// A locally built image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltImage {
    /// Engine image ID (`sha256:...`).
    pub id: String,
    pub target: BuildTarget,
    pub labels: ImageLabels,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn login(&self, auth: &RegistryAuth) -> Result<()>;

    async fn build(&self, request: &BuildRequest) -> Result<BuiltImage>;

    /// Copy `path_in_image` out of `image` to `dest` on local storage.
    async fn export_file(&self, image: &BuiltImage, path_in_image: &str, dest: &Path)
        -> Result<PathBuf>;

    /// Push `image` as `reference` and return the registry digest.
    async fn publish(&self, image: &BuiltImage, reference: &ImageReference)
        -> Result<PublishedImage>;
}

/// [`ContainerEngine`] backed by the docker CLI.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    program: String,
    timeout_secs: u64,
}

impl DockerEngine {
    pub fn new(program: &str, timeout_secs: u64) -> Self {
        Self {
            program: program.to_string(),
            timeout_secs,
        }
    }

    fn invocation<I, S>(&self, args: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new(&self.program, args).timeout(self.timeout_secs)
    }

    async fn run<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let output = CommandRunner::run_checked(&self.invocation(args)).await?;
        Ok(output.stdout.trim().to_string())
    }

    /// `RepoDigests` lookup for a pushed reference. Failures only yield `None`.
    async fn inspect_repo_digest(&self, reference: &ImageReference) -> Option<String> {
        let name = reference.to_string();
        match self
            .run(["image", "inspect", "--format", "{{json .RepoDigests}}", name.as_str()])
            .await
        {
            Ok(repo_digests) => select_repo_digest(&repo_digests, reference),
            Err(err) => {
                debug!(reference = %name, error = %err, "image inspect failed");
                None
            }
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    #[instrument(
        skip_all,
        fields(registry = %auth.registry, username = %auth.username),
        err(level = Level::DEBUG)
    )]
    async fn login(&self, auth: &RegistryAuth) -> Result<()> {
        let token = auth.token.expose_trimmed()?;
        let invocation = self.invocation([
            "login",
            auth.registry.as_str(),
            "--username",
            auth.username.as_str(),
            "--password-stdin",
        ]);
        CommandRunner::execute_with_stdin(&invocation, Some(token.as_bytes()))
            .await
            .and_then(CommandOutput::into_result)
            .map_err(|e| ReleaseError::Auth(format!("registry login failed: {e}")))?;

        info!("logged in to registry");
        Ok(())
    }

    #[instrument(skip_all, fields(target = ?request.target), err(level = Level::DEBUG))]
    async fn build(&self, request: &BuildRequest) -> Result<BuiltImage> {
        let scratch = tempfile::tempdir().map_err(|e| ReleaseError::io(std::env::temp_dir(), e))?;
        let dockerfile = scratch.path().join("Dockerfile");
        let iidfile = scratch.path().join("image.id");
        tokio::fs::write(&dockerfile, &request.dockerfile)
            .await
            .map_err(|e| ReleaseError::io(&dockerfile, e))?;

        let mut args = vec![
            "build".to_string(),
            "--file".to_string(),
            dockerfile.to_string_lossy().to_string(),
            "--target".to_string(),
            request.target.stage_name().to_string(),
            "--iidfile".to_string(),
            iidfile.to_string_lossy().to_string(),
        ];
        for (key, value) in request.labels.pairs() {
            args.push("--label".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(request.context.to_string_lossy().to_string());

        self.run(args).await?;

        let id = tokio::fs::read_to_string(&iidfile)
            .await
            .map_err(|e| ReleaseError::io(&iidfile, e))?
            .trim()
            .to_string();

        info!(image = %id, "built image");
        Ok(BuiltImage {
            id,
            target: request.target,
            labels: request.labels.clone(),
        })
    }

    #[instrument(
        skip_all,
        fields(image = %image.id, path = path_in_image),
        err(level = Level::DEBUG)
    )]
    async fn export_file(
        &self,
        image: &BuiltImage,
        path_in_image: &str,
        dest: &Path,
    ) -> Result<PathBuf> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ReleaseError::io(parent, e))?;
        }

        let container = self.run(["create", image.id.as_str()]).await?;
        let copied = self
            .run([
                "cp".to_string(),
                format!("{container}:{path_in_image}"),
                dest.to_string_lossy().to_string(),
            ])
            .await;

        if let Err(err) = self.run(["rm", "--force", container.as_str()]).await {
            warn!(%container, error = %err, "failed to remove export container");
        }
        copied?;

        debug!(dest = %dest.display(), "exported file from image");
        Ok(dest.to_path_buf())
    }

    #[instrument(
        skip_all,
        fields(image = %image.id, reference = %reference),
        err(level = Level::DEBUG)
    )]
    async fn publish(
        &self,
        image: &BuiltImage,
        reference: &ImageReference,
    ) -> Result<PublishedImage> {
        let name = reference.to_string();
        self.run(["tag", image.id.as_str(), name.as_str()]).await?;
        let pushed = self.run(["push", name.as_str()]).await?;

        // The push succeeded; a missing digest past this point is only logged.
        let digest = match digest_from_push_output(&pushed) {
            Some(sha) => Some(format!("{}/{}@{sha}", reference.registry, reference.repository)),
            None => self.inspect_repo_digest(reference).await,
        };
        if digest.is_none() {
            warn!(reference = %name, "pushed image but could not determine its digest");
        }

        Ok(PublishedImage {
            reference: reference.clone(),
            digest,
        })
    }
}

/// Registry host names docker treats as Docker Hub.
const DOCKER_HUB_HOSTS: [&str; 3] = ["docker.io", "index.docker.io", "registry-1.docker.io"];

/// The `sha256:...` digest from `docker push` output
/// (`latest: digest: sha256:... size: 1234`).
pub fn digest_from_push_output(output: &str) -> Option<String> {
    output.lines().rev().find_map(|line| {
        let (_, rest) = line.split_once("digest: ")?;
        rest.split_whitespace()
            .next()
            .filter(|digest| digest.starts_with("sha256:"))
            .map(str::to_string)
    })
}

/// Every name docker may print for `reference`'s repository in `RepoDigests`.
fn repository_names(reference: &ImageReference) -> Vec<String> {
    let mut names = vec![format!("{}/{}", reference.registry, reference.repository)];
    if DOCKER_HUB_HOSTS.contains(&reference.registry.as_str()) {
        let repository = reference.repository.as_str();
        let short = repository.strip_prefix("library/").unwrap_or(repository);
        for repo in [repository, short] {
            names.push(repo.to_string());
            names.extend(DOCKER_HUB_HOSTS.iter().map(|host| format!("{host}/{repo}")));
        }
    }
    names
}

/// Pick the `RepoDigests` entry belonging to `reference`'s repository.
pub fn select_repo_digest(inspect_json: &str, reference: &ImageReference) -> Option<String> {
    let digests: Vec<String> = serde_json::from_str(inspect_json).ok()?;
    let names = repository_names(reference);
    digests.into_iter().find(|digest| {
        digest
            .split_once('@')
            .is_some_and(|(name, _)| names.iter().any(|n| n == name))
    })
}
