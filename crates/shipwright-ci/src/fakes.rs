//! In-memory container engine (testing only).

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use shipwright_core::{ImageLabels, ImageReference, PublishedImage, ReleaseError, Result};

use crate::dockerfile::BuildTarget;
use crate::engine::{BuildRequest, BuiltImage, ContainerEngine, RegistryAuth};

/// Bytes written for every exported file.
pub const FAKE_BINARY: &[u8] = b"\x7fELF shipwright fake binary";

/// A call received by [`MemoryContainerEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Login { registry: String, username: String },
    Build { target: BuildTarget, labels: ImageLabels },
    Export { image: String, path: String, dest: PathBuf },
    Publish(String),
}

/// Container engine that records calls and writes a fixed binary on export.
#[derive(Debug, Default)]
pub struct MemoryContainerEngine {
    calls: Mutex<Vec<EngineCall>>,
    fail_login: bool,
    fail_build: bool,
    fail_export: bool,
    fail_publish_tag: Option<String>,
}

impl MemoryContainerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_login(mut self) -> Self {
        self.fail_login = true;
        self
    }

    pub fn failing_build(mut self) -> Self {
        self.fail_build = true;
        self
    }

    pub fn failing_export(mut self) -> Self {
        self.fail_export = true;
        self
    }

    /// Reject pushes of references tagged `tag`.
    pub fn failing_publish_of(mut self, tag: &str) -> Self {
        self.fail_publish_tag = Some(tag.to_string());
        self
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().clone()
    }

    /// References pushed, in order.
    pub fn published(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|call| match call {
                EngineCall::Publish(reference) => Some(reference.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<EngineCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: EngineCall) {
        self.lock().push(call);
    }
}

fn fake_command_error(command: impl Into<String>) -> ReleaseError {
    ReleaseError::Command {
        command: command.into(),
        detail: "simulated failure".to_string(),
    }
}

#[async_trait]
impl ContainerEngine for MemoryContainerEngine {
    async fn login(&self, auth: &RegistryAuth) -> Result<()> {
        self.record(EngineCall::Login {
            registry: auth.registry.clone(),
            username: auth.username.clone(),
        });
        auth.token.expose_trimmed()?;
        if self.fail_login {
            return Err(ReleaseError::Auth("registry login failed".to_string()));
        }
        Ok(())
    }

    async fn build(&self, request: &BuildRequest) -> Result<BuiltImage> {
        let build_count = {
            let mut calls = self.lock();
            calls.push(EngineCall::Build {
                target: request.target,
                labels: request.labels.clone(),
            });
            calls
                .iter()
                .filter(|c| matches!(c, EngineCall::Build { .. }))
                .count()
        };
        if self.fail_build {
            return Err(fake_command_error("build"));
        }
        Ok(BuiltImage {
            id: format!("sha256:fake{build_count:04}"),
            target: request.target,
            labels: request.labels.clone(),
        })
    }

    async fn export_file(
        &self,
        image: &BuiltImage,
        path_in_image: &str,
        dest: &Path,
    ) -> Result<PathBuf> {
        self.record(EngineCall::Export {
            image: image.id.clone(),
            path: path_in_image.to_string(),
            dest: dest.to_path_buf(),
        });
        if self.fail_export {
            return Err(fake_command_error("cp"));
        }
        tokio::fs::write(dest, FAKE_BINARY)
            .await
            .map_err(|e| ReleaseError::io(dest, e))?;
        Ok(dest.to_path_buf())
    }

    async fn publish(
        &self,
        image: &BuiltImage,
        reference: &ImageReference,
    ) -> Result<PublishedImage> {
        self.record(EngineCall::Publish(reference.to_string()));
        if self.fail_publish_tag.as_deref() == Some(reference.tag.as_str()) {
            return Err(fake_command_error(format!("push {reference}")));
        }
        Ok(PublishedImage {
            reference: reference.clone(),
            digest: Some(format!(
                "{}/{}@{}",
                reference.registry, reference.repository, image.id
            )),
        })
    }
}
