//! Orchestrator states.

use serde::Serialize;

/// Position of an invocation in the provisioning pipeline.
///
/// The pipeline is linear: `Idle → SourcePrepared → Uploaded →
/// BuildSubmitted → BuildPolling → ArtifactDiscovered → ArtifactDownloaded →
/// VersionPublished → ConfigurationStored → Completed`. Delete goes straight
/// from `Idle` to `Completed`; any error moves to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProvisionState {
    Idle,
    SourcePrepared,
    Uploaded,
    BuildSubmitted,
    BuildPolling,
    ArtifactDiscovered,
    ArtifactDownloaded,
    VersionPublished,
    ConfigurationStored,
    Completed,
    Failed,
}

impl ProvisionState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProvisionState::Idle => "idle",
            ProvisionState::SourcePrepared => "source_prepared",
            ProvisionState::Uploaded => "uploaded",
            ProvisionState::BuildSubmitted => "build_submitted",
            ProvisionState::BuildPolling => "build_polling",
            ProvisionState::ArtifactDiscovered => "artifact_discovered",
            ProvisionState::ArtifactDownloaded => "artifact_downloaded",
            ProvisionState::VersionPublished => "version_published",
            ProvisionState::ConfigurationStored => "configuration_stored",
            ProvisionState::Completed => "completed",
            ProvisionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
