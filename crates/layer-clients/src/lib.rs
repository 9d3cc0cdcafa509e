//! Layer-Clients: external service clients for the layer provisioner
//!
//! The provisioner only ever talks to four collaborators. This crate
//! defines them as traits, ships in-memory fakes for tests, and provides
//! the production backends.
//!
//! ## Key Components
//!
//! - `ArtifactStore` / `ObjectStoreArtifacts`: build sources and outputs (S3)
//! - `BuildService` / `CodeBuildService`: remote compilation jobs
//! - `RuntimeRegistry` / `LambdaLayerRegistry`: immutable layer versions
//! - `ConfigStore` / `SsmConfigStore`: the published identifier hand-off

mod aws_error;
pub mod client_traits;
pub mod codebuild_service;
mod error;
pub mod fakes;
pub mod lambda_registry;
pub mod object_store_artifacts;
pub mod ssm_config_store;

pub use client_traits::{
    match_artifact_key, ArtifactStore, BuildJob, BuildPhase, BuildService, BuildStatus,
    ClientResult, ConfigRecord, ConfigStore, Discovery, LayerPublication, LayerVersion,
    RuntimeRegistry, CONFIG_TYPE_STRING,
};
pub use codebuild_service::CodeBuildService;
pub use error::ClientError;
pub use lambda_registry::LambdaLayerRegistry;
pub use object_store_artifacts::ObjectStoreArtifacts;
pub use ssm_config_store::SsmConfigStore;
