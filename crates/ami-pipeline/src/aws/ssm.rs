//! Parameter Store as the discovery store for published image ids

use crate::aws::context::AwsContext;
use crate::aws::error::{AwsError, classify_aws_error};
use anyhow::{Context, Result};
use aws_sdk_ssm::Client;
use aws_sdk_ssm::error::ProvideErrorMetadata;
use aws_sdk_ssm::types::ParameterType;
use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;
use tracing::{info, warn};

/// Key/value discovery store operations.
///
/// Writes always overwrite; there is no versioning on top of what the
/// store itself keeps.
#[allow(async_fn_in_trait)]
#[cfg_attr(test, mockall::automock)]
pub trait ParameterOperations {
    /// Write `value` under `name`, replacing any previous value
    async fn put_parameter(&self, name: &str, value: &str, description: &str) -> Result<()>;

    /// Read the value under `name`. A missing key is an [`AwsError::NotFound`].
    async fn get_parameter(&self, name: &str) -> Result<String>;
}

/// SSM client scoped to one account and region
pub struct SsmClient {
    client: Client,
    region: String,
}

impl SsmClient {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.ssm_client(),
            region: ctx.region().to_string(),
        }
    }

    /// Overwrite a String parameter.
    ///
    /// Parameter Store throttles concurrent writes to one key
    /// (`TooManyUpdates`); those are retried with backoff.
    pub async fn put_parameter(&self, name: &str, value: &str, description: &str) -> Result<()> {
        (|| async {
            self.client
                .put_parameter()
                .name(name)
                .value(value)
                .description(description)
                .r#type(ParameterType::String)
                .overwrite(true)
                .send()
                .await
        })
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_secs(1))
                .with_max_delay(Duration::from_secs(10))
                .with_max_times(5),
        )
        .when(|e| classify_aws_error(e.code(), e.message()).is_retryable())
        .notify(|e, dur| {
            warn!(
                delay = ?dur,
                parameter = %name,
                error = %e,
                "Parameter Store throttled, backing off..."
            );
        })
        .await
        .with_context(|| format!("Failed to update parameter {name} in {}", self.region))?;

        info!(parameter = %name, value = %value, region = %self.region, "Parameter updated");
        Ok(())
    }

    pub async fn get_parameter(&self, name: &str) -> Result<String> {
        let response = match self.client.get_parameter().name(name).send().await {
            Ok(response) => response,
            Err(e) => {
                if classify_aws_error(e.code(), e.message()).is_not_found() {
                    return Err(AwsError::NotFound {
                        resource_type: "parameter",
                        resource_id: name.to_string(),
                    }
                    .into());
                }
                return Err(e).with_context(|| format!("Failed to read parameter {name}"));
            }
        };

        let value = response
            .parameter()
            .and_then(|p| p.value())
            .with_context(|| format!("Parameter {name} has no value"))?;

        info!(parameter = %name, value = %value, region = %self.region, "Fetched parameter");
        Ok(value.to_string())
    }
}

impl ParameterOperations for SsmClient {
    async fn put_parameter(&self, name: &str, value: &str, description: &str) -> Result<()> {
        SsmClient::put_parameter(self, name, value, description).await
    }

    async fn get_parameter(&self, name: &str) -> Result<String> {
        SsmClient::get_parameter(self, name).await
    }
}
