//! SSM Parameter Store implementation of the ConfigStore trait.

use async_trait::async_trait;
use aws_sdk_ssm::types::ParameterType;
use aws_sdk_ssm::Client;

use crate::aws_error::sdk_error;
use crate::client_traits::{ClientResult, ConfigStore};

/// Writes `String` parameters.
#[derive(Debug, Clone)]
pub struct SsmConfigStore {
    client: Client,
}

impl SsmConfigStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_conf(sdk_config: &aws_config::SdkConfig) -> Self {
        Self::new(Client::new(sdk_config))
    }
}

#[async_trait]
impl ConfigStore for SsmConfigStore {
    async fn put(&self, name: &str, value: &str, overwrite: bool) -> ClientResult<i64> {
        let output = self
            .client
            .put_parameter()
            .name(name)
            .value(value)
            .r#type(ParameterType::String)
            .overwrite(overwrite)
            .send()
            .await
            .map_err(|e| sdk_error("put_parameter", e))?;
        Ok(output.version())
    }
}
