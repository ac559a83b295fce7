//! EC2 image, launch template and instance operations

mod image;
mod instance;
mod launch_template;
mod operations;
mod types;

pub use operations::{ImageOperations, LaunchTemplateOperations};
pub use types::{ImageRequest, LaunchTemplateRef};

use crate::aws::context::AwsContext;
use anyhow::Result;
use aws_sdk_ec2::Client;

/// EC2 client scoped to one account and region
pub struct Ec2Client {
    pub(crate) client: Client,
    region: String,
}

impl Ec2Client {
    /// Create a new EC2 client (loads AWS config from environment)
    pub async fn new(region: &str) -> Result<Self> {
        let ctx = AwsContext::new(region).await;
        Ok(Self::from_context(&ctx))
    }

    /// Create an EC2 client from a pre-loaded AWS context
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.ec2_client(),
            region: ctx.region().to_string(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}
