//! Launch template version lookup and derivation

use super::Ec2Client;
use super::types::LaunchTemplateRef;
use anyhow::{Context, Result};
use aws_sdk_ec2::types::RequestLaunchTemplateData;
use tracing::{debug, info};

impl Ec2Client {
    /// Read the image id embedded in one launch template version
    pub async fn template_image_id(&self, template: &LaunchTemplateRef) -> Result<Option<String>> {
        let response = self
            .client
            .describe_launch_template_versions()
            .launch_template_id(&template.id)
            .versions(&template.version)
            .send()
            .await
            .with_context(|| format!("Failed to describe launch template {template}"))?;

        let version = response
            .launch_template_versions()
            .first()
            .with_context(|| format!("Launch template version {template} not found"))?;

        let image_id = version
            .launch_template_data()
            .and_then(|data| data.image_id())
            .map(str::to_string);

        debug!(template = %template, image_id = ?image_id, "Resolved launch template image");
        Ok(image_id)
    }

    /// Create a version copied from `template` with the image replaced.
    pub async fn create_template_version(
        &self,
        template: &LaunchTemplateRef,
        image_id: &str,
    ) -> Result<String> {
        let response = self
            .client
            .create_launch_template_version()
            .launch_template_id(&template.id)
            .source_version(&template.version)
            .version_description(format!("ami-pipeline: {image_id}"))
            .launch_template_data(RequestLaunchTemplateData::builder().image_id(image_id).build())
            .send()
            .await
            .with_context(|| format!("Failed to create launch template version from {template}"))?;

        let version = response
            .launch_template_version()
            .and_then(|v| v.version_number())
            .context("CreateLaunchTemplateVersion returned no version number")?
            .to_string();

        info!(
            launch_template_id = %template.id,
            source_version = %template.version,
            new_version = %version,
            image_id = %image_id,
            "Created launch template version"
        );
        Ok(version)
    }
}
