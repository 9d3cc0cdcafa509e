//! Layer Provisioner Library
//!
//! Builds a native module on a remote build service, publishes the output
//! as an immutable runtime layer version and records the version identifier
//! in a shared configuration store.
//!
//! ## Key Components
//!
//! - `SourcePackager`: synthesizes and archives the build project
//! - `wait_for_build` / `fetch_with_retry`: deadline-bounded waits
//! - `Provisioner`: the lifecycle state machine
//! - `obs` / `telemetry`: structured logging

pub mod config;
pub mod domain;
pub mod obs;
pub mod orchestrator;
pub mod packager;
pub mod polling;
pub mod telemetry;

pub use config::ProvisionerConfig;

pub use domain::{
    LifecycleAction, LifecycleEvent, ProvisionError, ProvisionState, ProvisioningRequest,
    ProvisioningResponse, ResourceProperties, ResponseData, Result,
};

pub use obs::{
    emit_artifact_discovered, emit_build_submitted, emit_config_stored, emit_invocation_failed,
    emit_invocation_finished, emit_invocation_started, emit_layer_published, emit_source_uploaded,
    emit_state_transition, InvocationSpan,
};

pub use orchestrator::{ProvisionReport, Provisioner, ProvisionerClients};

pub use packager::{
    ArchiveFormat, Archiver, BuildSourcePackage, LayerRecipe, PackagedSource, SourcePackager,
    TarGzArchiver, ZipArchiver,
};

pub use polling::{fetch_with_retry, wait_for_build, PollPolicy, RetryPolicy};

pub use telemetry::init_tracing;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
