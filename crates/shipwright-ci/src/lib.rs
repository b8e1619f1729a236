//! shipwright CI - build and release orchestration
//!
//! Provides the release coordinator that:
//! - Refuses to release a version whose tag already exists
//! - Builds the binary and runtime image through a container engine
//! - Creates the GitHub release, attaches the binary and pushes the image

pub mod builder;
pub mod dockerfile;
pub mod engine;
pub mod fakes;
pub mod pipeline;
pub mod runner;
pub mod stage;

// Re-export key types
pub use builder::ArtifactBuilder;
pub use dockerfile::BuildTarget;
pub use engine::{BuildRequest, BuiltImage, ContainerEngine, DockerEngine, RegistryAuth};
pub use pipeline::{
    publish_tags, PipelineError, ReleaseCoordinator, ReleaseOutcome, Stage, StageRecord,
    LATEST_TAG,
};
pub use runner::{CommandOutput, CommandRunner, Invocation};
pub use stage::{BuiltinCheck, CheckConfig};
