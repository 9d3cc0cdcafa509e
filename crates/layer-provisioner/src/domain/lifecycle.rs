//! Lifecycle events in and responses out.
//!
//! The hosting framework sends `{RequestType, PhysicalResourceId?,
//! ResourceProperties}` and expects `{PhysicalResourceId, Data: {LayerArn}}`
//! back. Fields this handler does not use are ignored.

use serde::{Deserialize, Serialize};

use super::error::{ProvisionError, Result};

/// Why the handler is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleAction {
    Create,
    Update,
    Delete,
}

impl LifecycleAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Create => "Create",
            LifecycleAction::Update => "Update",
            LifecycleAction::Delete => "Delete",
        }
    }
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-invocation overrides for the environment configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceProperties {
    #[serde(default)]
    pub build_project_name: Option<String>,
    #[serde(default)]
    pub artifact_bucket: Option<String>,
    #[serde(default)]
    pub config_parameter_name: Option<String>,
    #[serde(default)]
    pub environment_name: Option<String>,
}

/// Event as delivered by the infrastructure lifecycle framework.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleEvent {
    pub request_type: LifecycleAction,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
    #[serde(default)]
    pub resource_properties: ResourceProperties,
}

impl LifecycleEvent {
    /// Parse an event from its JSON body.
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| ProvisionError::InvalidEvent(e.to_string()))
    }

    /// The request the orchestrator consumes.
    pub fn request(&self) -> ProvisioningRequest {
        ProvisioningRequest {
            action: self.request_type,
            prior_id: self
                .physical_resource_id
                .clone()
                .filter(|id| !id.is_empty()),
        }
    }
}

/// One lifecycle invocation. Immutable; consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningRequest {
    pub action: LifecycleAction,
    /// External identifier returned by a previous invocation (Update/Delete)
    pub prior_id: Option<String>,
}

impl ProvisioningRequest {
    pub fn create() -> Self {
        Self {
            action: LifecycleAction::Create,
            prior_id: None,
        }
    }

    pub fn update(prior_id: &str) -> Self {
        Self {
            action: LifecycleAction::Update,
            prior_id: Some(prior_id.to_string()),
        }
    }

    pub fn delete(prior_id: &str) -> Self {
        Self {
            action: LifecycleAction::Delete,
            prior_id: Some(prior_id.to_string()),
        }
    }
}

/// Structured output data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseData {
    pub layer_arn: String,
}

/// What the handler returns to the framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProvisioningResponse {
    pub physical_resource_id: String,
    pub data: ResponseData,
}

impl ProvisioningResponse {
    /// The layer version identifier doubles as the external identifier.
    pub fn for_layer(arn: &str) -> Self {
        Self {
            physical_resource_id: arn.to_string(),
            data: ResponseData {
                layer_arn: arn.to_string(),
            },
        }
    }
}
