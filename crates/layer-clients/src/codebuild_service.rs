//! CodeBuild-backed implementation of the BuildService trait.

use async_trait::async_trait;
use aws_sdk_codebuild::types::Build;
use aws_sdk_codebuild::Client;
use tracing::debug;

use crate::aws_error::sdk_error;
use crate::client_traits::{BuildJob, BuildPhase, BuildService, BuildStatus, ClientResult};
use crate::error::ClientError;

/// Runs builds of pre-existing CodeBuild projects.
#[derive(Debug, Clone)]
pub struct CodeBuildService {
    client: Client,
}

impl CodeBuildService {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_conf(sdk_config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(sdk_config))
    }
}

fn to_job(build: &Build) -> ClientResult<BuildJob> {
    let id = build.id().ok_or_else(|| ClientError::Malformed {
        operation: "batch_get_builds",
        message: "build without an id".to_string(),
    })?;
    let status = match build.build_status() {
        Some(status) => status.as_str().parse::<BuildStatus>()?,
        None => BuildStatus::InProgress,
    };
    let phases = build
        .phases()
        .iter()
        .map(|phase| BuildPhase {
            name: phase
                .phase_type()
                .map(|t| t.as_str().to_string())
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            status: phase.phase_status().map(|s| s.as_str().to_string()),
            duration_secs: phase.duration_in_seconds(),
        })
        .collect();

    Ok(BuildJob {
        id: id.to_string(),
        status,
        current_phase: build.current_phase().map(str::to_string),
        phases,
        log_link: build
            .logs()
            .and_then(|logs| logs.deep_link())
            .map(str::to_string),
    })
}

#[async_trait]
impl BuildService for CodeBuildService {
    async fn submit(&self, project: &str) -> ClientResult<String> {
        let output = self
            .client
            .start_build()
            .project_name(project)
            .send()
            .await
            .map_err(|e| sdk_error("start_build", e))?;

        let id = output
            .build_value()
            .and_then(|build| build.id())
            .ok_or_else(|| ClientError::Malformed {
                operation: "start_build",
                message: format!("no build id returned for project {project}"),
            })?;
        debug!(project = %project, job_id = %id, "build started");
        Ok(id.to_string())
    }

    async fn poll(&self, job_id: &str) -> ClientResult<BuildJob> {
        let output = self
            .client
            .batch_get_builds()
            .ids(job_id)
            .send()
            .await
            .map_err(|e| sdk_error("batch_get_builds", e))?;

        match output.builds().first() {
            Some(build) => to_job(build),
            None => Err(ClientError::NotFound {
                key: job_id.to_string(),
            }),
        }
    }
}
