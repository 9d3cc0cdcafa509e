//! Client trait definitions for the layer provisioner
//!
//! These traits define the four external collaborators:
//! - `ArtifactStore`: byte blobs by key, with prefix listing and discovery
//! - `BuildService`: submit a build job and poll its status
//! - `RuntimeRegistry`: publish immutable runtime layer versions
//! - `ConfigStore`: durable named string values
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ClientError;

/// Result type for client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

// ---------------------------------------------------------------------------
// ArtifactStore: durable byte blobs
// ---------------------------------------------------------------------------

/// Outcome of looking for a build output whose exact key is not known upfront.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// A key matched; `listed` is the full listing it was chosen from.
    Found { key: String, listed: Vec<String> },
    /// Nothing matched; every listed key is kept for the error report.
    NotFound { listed: Vec<String> },
}

/// Select the key whose final path segment equals `file_name`.
///
/// The build service nests outputs under its own build id, so position in
/// the listing means nothing. When several keys match, only the one
/// containing `build_hint` is accepted; without a hinted match the older
/// outputs make the choice ambiguous and nothing is found.
pub fn match_artifact_key(
    mut listed: Vec<String>,
    file_name: &str,
    build_hint: Option<&str>,
) -> Discovery {
    listed.sort();
    let matches: Vec<&String> = listed
        .iter()
        .filter(|key| key.rsplit('/').next() == Some(file_name))
        .collect();

    let chosen = match matches.as_slice() {
        [] => None,
        [only] => Some((*only).clone()),
        many => {
            let hinted = build_hint
                .filter(|hint| !hint.is_empty())
                .and_then(|hint| many.iter().find(|key| key.contains(hint)));
            match hinted {
                Some(key) => {
                    tracing::debug!(matches = many.len(), chosen = %key, "build hint picked output");
                    Some((*key).clone())
                }
                None => {
                    tracing::warn!(
                        matches = many.len(),
                        hint = build_hint.unwrap_or("-"),
                        "several build outputs share the expected file name and none matches the build"
                    );
                    None
                }
            }
        }
    };

    match chosen {
        Some(key) => Discovery::Found { key, listed },
        None => Discovery::NotFound { listed },
    }
}

/// Durable key/value byte-blob store with prefix listing.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store bytes under `key`, replacing any previous object.
    async fn put(&self, key: &str, data: &[u8]) -> ClientResult<()>;

    /// Retrieve bytes by key. Returns `ClientError::NotFound` if absent.
    async fn get(&self, key: &str) -> ClientResult<Vec<u8>>;

    /// List every key under `prefix`, sorted.
    async fn list(&self, prefix: &str) -> ClientResult<Vec<String>>;

    /// List `prefix` and pick the key ending in `file_name`.
    async fn discover(
        &self,
        prefix: &str,
        file_name: &str,
        build_hint: Option<&str>,
    ) -> ClientResult<Discovery> {
        let listed = self.list(prefix).await?;
        Ok(match_artifact_key(listed, file_name, build_hint))
    }
}

// ---------------------------------------------------------------------------
// BuildService: remote compilation jobs
// ---------------------------------------------------------------------------

/// Status of a build job as reported by the build service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    InProgress,
    Succeeded,
    Failed,
    Fault,
    TimedOut,
    Stopped,
}

impl BuildStatus {
    /// Terminal statuses that mean the build did not produce an artifact.
    pub const FAILURES: [BuildStatus; 4] = [
        BuildStatus::Failed,
        BuildStatus::Fault,
        BuildStatus::TimedOut,
        BuildStatus::Stopped,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::InProgress => "IN_PROGRESS",
            BuildStatus::Succeeded => "SUCCEEDED",
            BuildStatus::Failed => "FAILED",
            BuildStatus::Fault => "FAULT",
            BuildStatus::TimedOut => "TIMED_OUT",
            BuildStatus::Stopped => "STOPPED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BuildStatus::InProgress)
    }
}

impl FromStr for BuildStatus {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(BuildStatus::InProgress),
            "SUCCEEDED" => Ok(BuildStatus::Succeeded),
            "FAILED" => Ok(BuildStatus::Failed),
            "FAULT" => Ok(BuildStatus::Fault),
            "TIMED_OUT" => Ok(BuildStatus::TimedOut),
            "STOPPED" => Ok(BuildStatus::Stopped),
            other => Err(ClientError::Malformed {
                operation: "batch_get_builds",
                message: format!("unknown build status {other:?}"),
            }),
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One phase of a build (`INSTALL`, `BUILD`, `UPLOAD_ARTIFACTS`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildPhase {
    pub name: String,
    pub status: Option<String>,
    pub duration_secs: Option<i64>,
}

/// Snapshot of a build job, owned by the build service and read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildJob {
    pub id: String,
    pub status: BuildStatus,
    pub current_phase: Option<String>,
    pub phases: Vec<BuildPhase>,
    /// Link into the build service's own log stream
    pub log_link: Option<String>,
}

impl BuildJob {
    /// `NAME:STATUS` pairs in execution order, e.g. `INSTALL:SUCCEEDED, BUILD:FAILED`.
    pub fn phase_summary(&self) -> String {
        if self.phases.is_empty() {
            return "no phases reported".to_string();
        }
        self.phases
            .iter()
            .map(|phase| match &phase.status {
                Some(status) => format!("{}:{}", phase.name, status),
                None => phase.name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The build-unique part of the id (`project:uuid` -> `uuid`).
    ///
    /// Output locations are nested by this value.
    pub fn id_suffix(&self) -> &str {
        self.id.rsplit(':').next().unwrap_or(&self.id)
    }
}

/// Remote build service running a named, pre-existing build project.
#[async_trait]
pub trait BuildService: Send + Sync {
    /// Start a build of `project` and return the job id.
    async fn submit(&self, project: &str) -> ClientResult<String>;

    /// Fetch the current state of a job.
    async fn poll(&self, job_id: &str) -> ClientResult<BuildJob>;
}

// ---------------------------------------------------------------------------
// RuntimeRegistry: immutable layer versions
// ---------------------------------------------------------------------------

/// Content and compatibility metadata for a new layer version.
#[derive(Debug, Clone)]
pub struct LayerPublication {
    pub name: String,
    pub description: Option<String>,
    pub content: Vec<u8>,
    pub compatible_runtimes: Vec<String>,
    pub compatible_architectures: Vec<String>,
}

/// A published, permanent layer version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerVersion {
    pub arn: String,
    pub version: i64,
}

/// Append-only registry of runtime layer versions.
///
/// Publishing never overwrites; each call creates a new version.
#[async_trait]
pub trait RuntimeRegistry: Send + Sync {
    async fn publish(&self, publication: LayerPublication) -> ClientResult<LayerVersion>;
}

// ---------------------------------------------------------------------------
// ConfigStore: shared named values
// ---------------------------------------------------------------------------

/// Type tag of every record written by the provisioner.
pub const CONFIG_TYPE_STRING: &str = "String";

/// A stored configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRecord {
    pub name: String,
    pub value: String,
    pub type_tag: String,
    pub version: i64,
}

/// Durable named string values shared with other deployments.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Write `value` under `name` and return the record's new version.
    async fn put(&self, name: &str, value: &str, overwrite: bool) -> ClientResult<i64>;
}
