//! Lambda layer implementation of the RuntimeRegistry trait.

use async_trait::async_trait;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::{Architecture, LayerVersionContentInput, Runtime};
use aws_sdk_lambda::Client;
use tracing::debug;

use crate::aws_error::sdk_error;
use crate::client_traits::{ClientResult, LayerPublication, LayerVersion, RuntimeRegistry};
use crate::error::ClientError;

/// Publishes Lambda layer versions from an in-memory zip.
#[derive(Debug, Clone)]
pub struct LambdaLayerRegistry {
    client: Client,
}

impl LambdaLayerRegistry {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_conf(sdk_config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(sdk_config))
    }
}

#[async_trait]
impl RuntimeRegistry for LambdaLayerRegistry {
    async fn publish(&self, publication: LayerPublication) -> ClientResult<LayerVersion> {
        let runtimes: Vec<Runtime> = publication
            .compatible_runtimes
            .iter()
            .map(|runtime| Runtime::from(runtime.as_str()))
            .collect();
        let architectures: Vec<Architecture> = publication
            .compatible_architectures
            .iter()
            .map(|arch| Architecture::from(arch.as_str()))
            .collect();
        let size = publication.content.len();
        let content = LayerVersionContentInput::builder()
            .zip_file(Blob::new(publication.content))
            .build();

        let output = self
            .client
            .publish_layer_version()
            .layer_name(&publication.name)
            .set_description(publication.description)
            .content(content)
            .set_compatible_runtimes(Some(runtimes))
            .set_compatible_architectures(Some(architectures))
            .send()
            .await
            .map_err(|e| sdk_error("publish_layer_version", e))?;

        let arn = output
            .layer_version_arn()
            .ok_or_else(|| ClientError::Malformed {
                operation: "publish_layer_version",
                message: format!("no version ARN returned for layer {}", publication.name),
            })?;
        debug!(layer = %publication.name, arn = %arn, size, "layer version published");
        Ok(LayerVersion {
            arn: arn.to_string(),
            version: output.version(),
        })
    }
}
