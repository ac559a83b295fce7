//! EC2 operations traits for testing

use super::Ec2Client;
use super::types::{ImageRequest, LaunchTemplateRef};
use ami_pipeline_common::ImageState;
use anyhow::Result;

/// Image lifecycle operations used by the promotion pipeline.
///
/// Abstracts the EC2 client so the pipeline can be unit tested without
/// hitting real AWS.
#[allow(async_fn_in_trait)] // Internal use only, pipelines run on one task
pub trait ImageOperations {
    /// Start building an image from a running instance without rebooting it.
    /// Returns the new image id as soon as the request is accepted.
    async fn create_image(&self, request: &ImageRequest) -> Result<String>;

    /// Current state of an image, `None` if it does not exist
    async fn describe_image_state(&self, image_id: &str) -> Result<Option<ImageState>>;

    /// Grant launch permission to every account in one call
    async fn share_image(&self, image_id: &str, account_ids: &[String]) -> Result<()>;

    /// Copy an image from `source_region` into this client's region.
    /// Returns the id of the copy, which is distinct from the source id.
    async fn copy_image(
        &self,
        source_image_id: &str,
        source_region: &str,
        request: &ImageRequest,
    ) -> Result<String>;
}

/// Launch template operations used by the node group patcher
#[allow(async_fn_in_trait)]
pub trait LaunchTemplateOperations {
    /// Image id embedded in a launch template version, if any
    async fn template_image_id(&self, template: &LaunchTemplateRef) -> Result<Option<String>>;

    /// Create a new version derived from `template` with only the image
    /// replaced. Returns the new version number.
    async fn create_template_version(
        &self,
        template: &LaunchTemplateRef,
        image_id: &str,
    ) -> Result<String>;
}

impl ImageOperations for Ec2Client {
    async fn create_image(&self, request: &ImageRequest) -> Result<String> {
        Ec2Client::create_image(self, request).await
    }

    async fn describe_image_state(&self, image_id: &str) -> Result<Option<ImageState>> {
        Ec2Client::describe_image_state(self, image_id).await
    }

    async fn share_image(&self, image_id: &str, account_ids: &[String]) -> Result<()> {
        Ec2Client::share_image(self, image_id, account_ids).await
    }

    async fn copy_image(
        &self,
        source_image_id: &str,
        source_region: &str,
        request: &ImageRequest,
    ) -> Result<String> {
        Ec2Client::copy_image(self, source_image_id, source_region, request).await
    }
}

impl LaunchTemplateOperations for Ec2Client {
    async fn template_image_id(&self, template: &LaunchTemplateRef) -> Result<Option<String>> {
        Ec2Client::template_image_id(self, template).await
    }

    async fn create_template_version(
        &self,
        template: &LaunchTemplateRef,
        image_id: &str,
    ) -> Result<String> {
        Ec2Client::create_template_version(self, template, image_id).await
    }
}
