//! Error taxonomy for provisioning invocations.
//!
//! Nothing is swallowed: every variant carries the identifiers an operator
//! needs to diagnose a failed deployment from the message alone.

use layer_clients::{BuildStatus, ClientError};

use super::state::ProvisionState;

fn listing(keys: &[String]) -> String {
    if keys.is_empty() {
        "<none>".to_string()
    } else {
        keys.join(", ")
    }
}

/// Provisioning errors.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("packaging build source failed: {0}")]
    Packaging(String),

    #[error("uploading build source to {key} failed: {source}")]
    Upload { key: String, source: ClientError },

    #[error("submitting build for project {project} failed: {source}")]
    Submission {
        project: String,
        source: ClientError,
    },

    #[error("checking build {job_id} failed {errors} times in a row: {source}")]
    BuildStatus {
        job_id: String,
        errors: u32,
        source: ClientError,
    },

    #[error("build {job_id} finished with status {status} (phases: {phases}); build logs: {log_link}")]
    BuildFailed {
        job_id: String,
        status: BuildStatus,
        phases: String,
        log_link: String,
    },

    #[error("build {job_id} still {last_status} after {polls} polls when the invocation deadline was reached")]
    BuildDeadlineExceeded {
        job_id: String,
        last_status: BuildStatus,
        polls: u32,
    },

    #[error("listing build outputs under {prefix} failed: {source}")]
    Listing { prefix: String, source: ClientError },

    #[error("build {job_id} succeeded but no {expected} was found under {prefix}; listed keys: [{}]", listing(.listed))]
    ArtifactNotFound {
        job_id: String,
        prefix: String,
        expected: String,
        listed: Vec<String>,
    },

    #[error("fetching {key} failed after {attempts} attempts: {source}; listed keys: [{}]", listing(.listed))]
    Fetch {
        key: String,
        attempts: u32,
        listed: Vec<String>,
        source: ClientError,
    },

    #[error("publishing layer {layer} failed: {source}")]
    Publish { layer: String, source: ClientError },

    #[error("writing configuration {name} = {value} failed: {source}")]
    ConfigWrite {
        name: String,
        value: String,
        source: ClientError,
    },

    #[error("invalid lifecycle event: {0}")]
    InvalidEvent(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invocation deadline reached in state {state}")]
    DeadlineExceeded { state: ProvisionState },
}

/// Result type for provisioning operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;
