//! Provisioning orchestrator.
//!
//! Sequences packager → artifact store → build service → artifact store →
//! runtime registry → configuration store for one lifecycle invocation. The
//! whole pipeline runs under the invocation deadline; there is no rollback
//! and no resumption, a failed invocation is simply re-run from scratch.

use std::sync::Arc;
use std::time::Duration;

use layer_clients::{
    ArtifactStore, BuildJob, BuildService, BuildStatus, ConfigStore, Discovery, LayerPublication,
    RuntimeRegistry,
};
use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use tracing::Instrument;

use crate::config::ProvisionerConfig;
use crate::domain::{
    LifecycleAction, ProvisionError, ProvisionState, ProvisioningRequest, ProvisioningResponse,
    Result,
};
use crate::obs::{self, InvocationSpan};
use crate::packager::{LayerRecipe, SourcePackager};
use crate::polling::{fetch_with_retry, wait_for_build};

/// Stand-in deadline for a budget too long to represent; about thirty years.
const UNBOUNDED_BUDGET: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The four external collaborators, constructed once and injected.
#[derive(Clone)]
pub struct ProvisionerClients {
    pub artifacts: Arc<dyn ArtifactStore>,
    pub builds: Arc<dyn BuildService>,
    pub registry: Arc<dyn RuntimeRegistry>,
    pub config_store: Arc<dyn ConfigStore>,
}

/// Outcome of a successful invocation.
///
/// `response` is what the lifecycle framework receives; the rest is for
/// logs and tests.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub invocation_id: String,
    pub response: ProvisioningResponse,
    /// Every state entered, starting at `Idle`
    pub transitions: Vec<ProvisionState>,
    pub job: Option<BuildJob>,
    pub artifact_key: Option<String>,
    pub source_digest: Option<String>,
    pub config_version: Option<i64>,
}

/// Mutable bookkeeping for one pass through the pipeline.
#[derive(Debug)]
struct PipelineRun {
    state: ProvisionState,
    transitions: Vec<ProvisionState>,
    job: Option<BuildJob>,
    artifact_key: Option<String>,
    source_digest: Option<String>,
    config_version: Option<i64>,
}

impl PipelineRun {
    fn new() -> Self {
        Self {
            state: ProvisionState::Idle,
            transitions: vec![ProvisionState::Idle],
            job: None,
            artifact_key: None,
            source_digest: None,
            config_version: None,
        }
    }

    fn advance(&mut self, next: ProvisionState) {
        obs::emit_state_transition(self.state, next);
        self.state = next;
        self.transitions.push(next);
    }

    fn into_report(self, invocation_id: &str, response: ProvisioningResponse) -> ProvisionReport {
        ProvisionReport {
            invocation_id: invocation_id.to_string(),
            response,
            transitions: self.transitions,
            job: self.job,
            artifact_key: self.artifact_key,
            source_digest: self.source_digest,
            config_version: self.config_version,
        }
    }
}

/// Build-and-publish orchestrator for one native runtime layer.
pub struct Provisioner {
    config: ProvisionerConfig,
    recipe: LayerRecipe,
    packager: SourcePackager,
    clients: ProvisionerClients,
}

impl Provisioner {
    pub fn new(config: ProvisionerConfig, recipe: LayerRecipe, clients: ProvisionerClients) -> Self {
        let packager = SourcePackager::new(config.archive_format);
        Self {
            config,
            recipe,
            packager,
            clients,
        }
    }

    /// Handle one invocation within the configured invocation budget.
    pub async fn handle(&self, request: ProvisioningRequest) -> Result<ProvisionReport> {
        let now = Instant::now();
        let deadline = now
            .checked_add(self.config.invocation_budget)
            .or_else(|| now.checked_add(UNBOUNDED_BUDGET))
            .unwrap_or(now);
        self.handle_until(request, deadline).await
    }

    /// Handle one invocation, failing with `DeadlineExceeded` at `deadline`.
    pub async fn handle_until(
        &self,
        request: ProvisioningRequest,
        deadline: Instant,
    ) -> Result<ProvisionReport> {
        let invocation = InvocationSpan::new(request.action);
        self.invoke(&invocation, request, deadline)
            .instrument(invocation.span())
            .await
    }

    async fn invoke(
        &self,
        invocation: &InvocationSpan,
        request: ProvisioningRequest,
        deadline: Instant,
    ) -> Result<ProvisionReport> {
        let started = Instant::now();
        obs::emit_invocation_started(request.action, request.prior_id.as_deref());
        let mut run = PipelineRun::new();

        // Layer versions and the config record outlive the resource; Delete touches nothing.
        if request.action == LifecycleAction::Delete {
            let physical_id = request
                .prior_id
                .unwrap_or_else(|| self.config.layer_name());
            run.advance(ProvisionState::Completed);
            let response = ProvisioningResponse::for_layer(&physical_id);
            obs::emit_invocation_finished(&physical_id, elapsed_ms(started), run.transitions.len());
            return Ok(run.into_report(invocation.invocation_id(), response));
        }

        let outcome = timeout_at(deadline, self.run_pipeline(&mut run, deadline)).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(ProvisionError::DeadlineExceeded { state: run.state }),
        };

        match result {
            Ok(response) => {
                run.advance(ProvisionState::Completed);
                obs::emit_invocation_finished(
                    &response.physical_resource_id,
                    elapsed_ms(started),
                    run.transitions.len(),
                );
                Ok(run.into_report(invocation.invocation_id(), response))
            }
            Err(e) => {
                let failed_in = run.state;
                run.advance(ProvisionState::Failed);
                obs::emit_invocation_failed(failed_in, &e);
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        run: &mut PipelineRun,
        deadline: Instant,
    ) -> Result<ProvisioningResponse> {
        let clients = &self.clients;
        let config = &self.config;

        let packaged = self.packager.package(&self.recipe)?;
        run.source_digest = Some(packaged.digest.clone());
        run.advance(ProvisionState::SourcePrepared);

        clients
            .artifacts
            .put(&config.source_key, &packaged.archive)
            .await
            .map_err(|source| ProvisionError::Upload {
                key: config.source_key.clone(),
                source,
            })?;
        obs::emit_source_uploaded(&config.source_key, packaged.archive.len(), &packaged.digest);
        run.advance(ProvisionState::Uploaded);

        let job_id = clients
            .builds
            .submit(&config.build_project_name)
            .await
            .map_err(|source| ProvisionError::Submission {
                project: config.build_project_name.clone(),
                source,
            })?;
        obs::emit_build_submitted(&config.build_project_name, &job_id);
        run.advance(ProvisionState::BuildSubmitted);

        run.advance(ProvisionState::BuildPolling);
        let job = wait_for_build(
            clients.builds.as_ref(),
            &job_id,
            config.poll_policy(),
            deadline,
        )
        .await?;
        run.job = Some(job.clone());
        if job.status != BuildStatus::Succeeded {
            return Err(ProvisionError::BuildFailed {
                job_id,
                status: job.status,
                phases: job.phase_summary(),
                log_link: job
                    .log_link
                    .clone()
                    .unwrap_or_else(|| "<not reported>".to_string()),
            });
        }

        let discovery = clients
            .artifacts
            .discover(
                &config.output_prefix,
                &self.recipe.output_file,
                Some(job.id_suffix()),
            )
            .await
            .map_err(|source| ProvisionError::Listing {
                prefix: config.output_prefix.clone(),
                source,
            })?;
        let (key, listed) = match discovery {
            Discovery::Found { key, listed } => (key, listed),
            Discovery::NotFound { listed } => {
                return Err(ProvisionError::ArtifactNotFound {
                    job_id,
                    prefix: config.output_prefix.clone(),
                    expected: self.recipe.output_file.clone(),
                    listed,
                })
            }
        };
        obs::emit_artifact_discovered(&key, listed.len());
        run.artifact_key = Some(key.clone());
        run.advance(ProvisionState::ArtifactDiscovered);

        let content = fetch_with_retry(
            clients.artifacts.as_ref(),
            &key,
            config.retry_policy(),
            deadline,
            &listed,
        )
        .await?;
        run.advance(ProvisionState::ArtifactDownloaded);

        let layer = config.layer_name();
        let layer_bytes = content.len();
        let publication = LayerPublication {
            name: layer.clone(),
            description: Some(self.recipe.layer_description(&packaged.digest)),
            content,
            compatible_runtimes: config.compatible_runtimes.clone(),
            compatible_architectures: config.compatible_architectures.clone(),
        };
        let version = clients
            .registry
            .publish(publication)
            .await
            .map_err(|source| ProvisionError::Publish {
                layer: layer.clone(),
                source,
            })?;
        obs::emit_layer_published(&layer, &version.arn, layer_bytes);
        run.advance(ProvisionState::VersionPublished);

        let config_version = clients
            .config_store
            .put(&config.config_parameter_name, &version.arn, true)
            .await
            .map_err(|source| ProvisionError::ConfigWrite {
                name: config.config_parameter_name.clone(),
                value: version.arn.clone(),
                source,
            })?;
        obs::emit_config_stored(&config.config_parameter_name, &version.arn, config_version);
        run.config_version = Some(config_version);
        run.advance(ProvisionState::ConfigurationStored);

        Ok(ProvisioningResponse::for_layer(&version.arn))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use layer_clients::fakes::{
        MemoryArtifactStore, MemoryConfigStore, MemoryRuntimeRegistry, ScriptedBuildService,
    };
    use async_trait::async_trait;
    use layer_clients::{ClientResult, LayerVersion};

    /// Registry whose publish call never returns.
    struct HangingRegistry;

    #[async_trait]
    impl RuntimeRegistry for HangingRegistry {
        async fn publish(&self, _publication: LayerPublication) -> ClientResult<LayerVersion> {
            std::future::pending().await
        }
    }

    struct Harness {
        artifacts: Arc<MemoryArtifactStore>,
        builds: Arc<ScriptedBuildService>,
        registry: Arc<MemoryRuntimeRegistry>,
        config_store: Arc<MemoryConfigStore>,
    }

    impl Harness {
        fn new(artifacts: MemoryArtifactStore, builds: ScriptedBuildService) -> Self {
            Self {
                artifacts: Arc::new(artifacts),
                builds: Arc::new(builds),
                registry: Arc::new(MemoryRuntimeRegistry::new()),
                config_store: Arc::new(MemoryConfigStore::new()),
            }
        }

        fn provisioner(&self) -> Provisioner {
            Provisioner::new(
                ProvisionerConfig::new("p", "b", "/ns/layer-arn", "dev"),
                LayerRecipe::default(),
                ProvisionerClients {
                    artifacts: self.artifacts.clone(),
                    builds: self.builds.clone(),
                    registry: self.registry.clone(),
                    config_store: self.config_store.clone(),
                },
            )
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_without_prior_id_returns_layer_name() {
        let harness = Harness::new(
            MemoryArtifactStore::new(),
            ScriptedBuildService::succeeding_after(1),
        );
        let request = ProvisioningRequest {
            action: LifecycleAction::Delete,
            prior_id: None,
        };

        let report = harness.provisioner().handle(request).await.unwrap();

        assert_eq!(report.response.physical_resource_id, "dev-swetest-layer");
        assert_eq!(
            report.transitions,
            vec![ProvisionState::Idle, ProvisionState::Completed]
        );
        assert_eq!(harness.builds.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_walks_every_state() {
        let harness = Harness::new(
            MemoryArtifactStore::new().with_object("build/xyz/layer.zip", b"PK"),
            ScriptedBuildService::succeeding_after(2),
        );

        let report = harness
            .provisioner()
            .handle(ProvisioningRequest::create())
            .await
            .unwrap();

        assert_eq!(
            report.transitions,
            vec![
                ProvisionState::Idle,
                ProvisionState::SourcePrepared,
                ProvisionState::Uploaded,
                ProvisionState::BuildSubmitted,
                ProvisionState::BuildPolling,
                ProvisionState::ArtifactDiscovered,
                ProvisionState::ArtifactDownloaded,
                ProvisionState::VersionPublished,
                ProvisionState::ConfigurationStored,
                ProvisionState::Completed,
            ]
        );
        assert_eq!(report.artifact_key.as_deref(), Some("build/xyz/layer.zip"));
        assert_eq!(report.config_version, Some(1));
        assert!(report.source_digest.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_budget_does_not_panic() {
        let harness = Harness::new(
            MemoryArtifactStore::new().with_object("build/xyz/layer.zip", b"PK"),
            ScriptedBuildService::succeeding_after(2),
        );
        let mut config = ProvisionerConfig::new("p", "b", "/ns/layer-arn", "dev");
        config.invocation_budget = Duration::MAX;
        let provisioner = Provisioner::new(
            config,
            LayerRecipe::default(),
            ProvisionerClients {
                artifacts: harness.artifacts.clone(),
                builds: harness.builds.clone(),
                registry: harness.registry.clone(),
                config_store: harness.config_store.clone(),
            },
        );

        let report = provisioner
            .handle(ProvisioningRequest::create())
            .await
            .unwrap();

        assert_eq!(report.config_version, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_is_uploaded_to_configured_key() {
        let harness = Harness::new(
            MemoryArtifactStore::new().with_object("build/xyz/layer.zip", b"PK"),
            ScriptedBuildService::succeeding_after(1),
        );
        let provisioner = harness.provisioner();
        provisioner
            .handle(ProvisioningRequest::create())
            .await
            .unwrap();

        let uploaded = harness.artifacts.object("swetest-layer/source.zip").unwrap();
        let expected = SourcePackager::default()
            .package(&LayerRecipe::default())
            .unwrap();
        assert_eq!(uploaded, expected.archive);
        assert_eq!(harness.builds.submitted_projects(), vec!["p"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publication_carries_compatibility_and_digest() {
        let harness = Harness::new(
            MemoryArtifactStore::new().with_object("build/xyz/layer.zip", b"PK"),
            ScriptedBuildService::succeeding_after(1),
        );
        let report = harness
            .provisioner()
            .handle(ProvisioningRequest::update("arn:old"))
            .await
            .unwrap();

        let published = harness.registry.published();
        assert_eq!(published.len(), 1);
        let publication = &published[0].publication;
        assert_eq!(publication.name, "dev-swetest-layer");
        assert_eq!(publication.content, b"PK");
        assert_eq!(publication.compatible_runtimes, vec!["nodejs18.x", "nodejs20.x"]);
        assert_eq!(publication.compatible_architectures, vec!["x86_64"]);
        let digest = report.source_digest.unwrap();
        assert!(publication.description.as_deref().unwrap().contains(&digest));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_submission_stops_pipeline() {
        let harness = Harness::new(
            MemoryArtifactStore::new(),
            ScriptedBuildService::rejecting("quota exceeded"),
        );

        let err = harness
            .provisioner()
            .handle(ProvisioningRequest::create())
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Submission { ref project, .. } if project == "p"));
        assert!(err.to_string().contains("quota exceeded"));
        assert_eq!(harness.registry.publish_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_endless_build_stops_at_deadline() {
        let harness = Harness::new(
            MemoryArtifactStore::new(),
            ScriptedBuildService::new(vec![BuildStatus::InProgress]),
        );
        let deadline = Instant::now() + Duration::from_secs(60);

        let err = harness
            .provisioner()
            .handle_until(ProvisioningRequest::create(), deadline)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::BuildDeadlineExceeded {
                last_status: BuildStatus::InProgress,
                ..
            }
        ));
        assert_eq!(harness.registry.publish_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_call_fails_with_current_state() {
        let harness = Harness::new(
            MemoryArtifactStore::new().with_object("build/xyz/layer.zip", b"PK"),
            ScriptedBuildService::succeeding_after(1),
        );
        let provisioner = Provisioner::new(
            ProvisionerConfig::new("p", "b", "/ns/layer-arn", "dev"),
            LayerRecipe::default(),
            ProvisionerClients {
                artifacts: harness.artifacts.clone(),
                builds: harness.builds.clone(),
                registry: Arc::new(HangingRegistry),
                config_store: harness.config_store.clone(),
            },
        );
        let deadline = Instant::now() + Duration::from_secs(30);

        let err = provisioner
            .handle_until(ProvisioningRequest::create(), deadline)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProvisionError::DeadlineExceeded {
                state: ProvisionState::ArtifactDownloaded
            }
        ));
        assert!(harness.config_store.writes().is_empty());
    }
}
