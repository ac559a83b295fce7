//! Image creation, state lookup, sharing and cross-region copy

use super::Ec2Client;
use super::types::ImageRequest;
use crate::aws::error::classify_aws_error;
use ami_pipeline_common::{ImageState, tags};
use anyhow::{Context, Result};
use aws_sdk_ec2::error::ProvideErrorMetadata;
use aws_sdk_ec2::types::{
    LaunchPermission, LaunchPermissionModifications, ResourceType, Tag, TagSpecification,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Build a TagSpecification with the standard image tags
fn image_tag_spec(
    resource_type: ResourceType,
    source_instance: &str,
    created_at: DateTime<Utc>,
) -> TagSpecification {
    tags::image_tags(source_instance, created_at)
        .into_iter()
        .fold(
            TagSpecification::builder().resource_type(resource_type),
            |builder, (key, value)| builder.tags(Tag::builder().key(key).value(value).build()),
        )
        .build()
}

impl Ec2Client {
    /// Start image creation from an instance.
    ///
    /// Uses no-reboot so the source instance keeps serving. The image and
    /// its snapshots are tagged at creation time.
    pub async fn create_image(&self, request: &ImageRequest) -> Result<String> {
        let created_at = Utc::now();

        let response = self
            .client
            .create_image()
            .instance_id(&request.instance_id)
            .name(&request.name)
            .description(&request.description)
            .no_reboot(true)
            .tag_specifications(image_tag_spec(
                ResourceType::Image,
                &request.instance_id,
                created_at,
            ))
            .tag_specifications(image_tag_spec(
                ResourceType::Snapshot,
                &request.instance_id,
                created_at,
            ))
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to create image from instance {}",
                    request.instance_id
                )
            })?;

        let image_id = response
            .image_id()
            .context("CreateImage returned no image ID")?
            .to_string();

        info!(
            image_id = %image_id,
            instance_id = %request.instance_id,
            region = %self.region(),
            "Image creation initiated"
        );

        Ok(image_id)
    }

    /// Look up the current state of an image.
    ///
    /// Both an empty result and a not-found error code mean the image does
    /// not exist.
    pub async fn describe_image_state(&self, image_id: &str) -> Result<Option<ImageState>> {
        let response = match self.client.describe_images().image_ids(image_id).send().await {
            Ok(response) => response,
            Err(e) => {
                if classify_aws_error(e.code(), e.message()).is_not_found() {
                    debug!(image_id = %image_id, "Image not found");
                    return Ok(None);
                }
                return Err(e).with_context(|| format!("Failed to describe image {image_id}"));
            }
        };

        let state = response.images().first().map(|image| {
            image
                .state()
                .map(|s| ImageState::from_ec2(s.as_str()))
                .unwrap_or(ImageState::Pending)
        });

        debug!(image_id = %image_id, state = ?state, "Image state");
        Ok(state)
    }

    /// Add launch permission for every account in a single call
    pub async fn share_image(&self, image_id: &str, account_ids: &[String]) -> Result<()> {
        let permissions = account_ids
            .iter()
            .fold(LaunchPermissionModifications::builder(), |builder, id| {
                builder.add(LaunchPermission::builder().user_id(id).build())
            })
            .build();

        self.client
            .modify_image_attribute()
            .image_id(image_id)
            .launch_permission(permissions)
            .send()
            .await
            .with_context(|| format!("Failed to share image {image_id}"))?;

        info!(
            image_id = %image_id,
            accounts = ?account_ids,
            region = %self.region(),
            "Image shared"
        );
        Ok(())
    }

    /// Request a copy of `source_image_id` from `source_region` into this
    /// client's region.
    ///
    /// The copy keeps the source name and description. Tags are applied
    /// after the request is accepted; a tagging failure is only logged.
    pub async fn copy_image(
        &self,
        source_image_id: &str,
        source_region: &str,
        request: &ImageRequest,
    ) -> Result<String> {
        info!(
            source_image_id = %source_image_id,
            source_region = %source_region,
            dest_region = %self.region(),
            "Copying image"
        );

        let response = self
            .client
            .copy_image()
            .source_image_id(source_image_id)
            .source_region(source_region)
            .name(&request.name)
            .description(&request.description)
            .send()
            .await
            .with_context(|| {
                format!("Failed to copy image {source_image_id} from {source_region}")
            })?;

        let image_id = response
            .image_id()
            .context("CopyImage returned no image ID")?
            .to_string();

        info!(image_id = %image_id, "Copy initiated");

        if let Err(e) = self.tag_image(&image_id, &request.instance_id).await {
            warn!(image_id = %image_id, error = ?e, "Failed to tag copied image");
        }

        Ok(image_id)
    }

    async fn tag_image(&self, image_id: &str, source_instance: &str) -> Result<()> {
        let tags = tags::image_tags(source_instance, Utc::now())
            .into_iter()
            .map(|(key, value)| Tag::builder().key(key).value(value).build())
            .collect();

        self.client
            .create_tags()
            .resources(image_id)
            .set_tags(Some(tags))
            .send()
            .await
            .with_context(|| format!("Failed to tag image {image_id}"))?;
        Ok(())
    }
}
