//! Structured observability hooks for provisioning invocations.
//!
//! This module provides:
//! - Invocation-scoped tracing spans via `InvocationSpan`
//! - Emission functions for the pipeline's milestones: start, state
//!   transition, source upload, build submission, layer publication, finish
//!
//! Events are emitted at `info!` level (failures at `warn!`/`error!`), with
//! an `event` field so log pipelines can filter on it.

use tracing::{error, info};
use uuid::Uuid;

use crate::domain::{LifecycleAction, ProvisionState};

/// Invocation-scoped span tagged with a fresh invocation id.
///
/// The pipeline awaits while inside it, so it is attached with
/// `tracing::Instrument` rather than entered.
///
/// ```ignore
/// let invocation = InvocationSpan::new(LifecycleAction::Create);
/// run(request).instrument(invocation.span()).await
/// ```
#[derive(Debug, Clone)]
pub struct InvocationSpan {
    invocation_id: String,
    span: tracing::Span,
}

impl InvocationSpan {
    pub fn new(action: LifecycleAction) -> Self {
        let invocation_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "layer.invocation",
            invocation_id = %invocation_id,
            action = %action
        );
        Self {
            invocation_id,
            span,
        }
    }

    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    pub fn span(&self) -> tracing::Span {
        self.span.clone()
    }
}

/// Emit event: invocation started.
pub fn emit_invocation_started(action: LifecycleAction, prior_id: Option<&str>) {
    info!(
        event = "invocation.started",
        action = %action,
        prior_id = prior_id.unwrap_or("-"),
    );
}

/// Emit event: state machine moved from `from` to `to`.
pub fn emit_state_transition(from: ProvisionState, to: ProvisionState) {
    info!(event = "state.transition", from = %from, to = %to);
}

/// Emit event: build source archived and stored.
pub fn emit_source_uploaded(key: &str, bytes: usize, digest: &str) {
    info!(
        event = "source.uploaded",
        key = %key,
        bytes = bytes,
        digest = %digest,
    );
}

/// Emit event: build job accepted by the build service.
pub fn emit_build_submitted(project: &str, job_id: &str) {
    info!(event = "build.submitted", project = %project, job_id = %job_id);
}

/// Emit event: build output located.
pub fn emit_artifact_discovered(key: &str, listed: usize) {
    info!(event = "artifact.discovered", key = %key, listed = listed);
}

/// Emit event: new layer version published.
pub fn emit_layer_published(layer: &str, arn: &str, bytes: usize) {
    info!(event = "layer.published", layer = %layer, arn = %arn, bytes = bytes);
}

/// Emit event: configuration record now points at `value`.
pub fn emit_config_stored(name: &str, value: &str, version: i64) {
    info!(
        event = "config.stored",
        name = %name,
        value = %value,
        version = version,
    );
}

/// Emit event: invocation finished successfully.
pub fn emit_invocation_finished(physical_id: &str, duration_ms: u64, transitions: usize) {
    info!(
        event = "invocation.finished",
        physical_id = %physical_id,
        duration_ms = duration_ms,
        transitions = transitions,
    );
}

/// Emit event: invocation failed while in `state` (error level).
pub fn emit_invocation_failed(state: ProvisionState, error: &dyn std::fmt::Display) {
    error!(event = "invocation.failed", state = %state, error = %error);
}
