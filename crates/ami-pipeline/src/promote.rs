//! Golden image promotion
//!
//! Turns a configured instance into a shared, discoverable image:
//!
//! 1. Build an image in the primary region and wait for it to converge
//! 2. Share it with the target accounts and publish its id under the
//!    discovery key, first in the owning account and then in each target
//! 3. Optionally copy it into the DR region and repeat step 2 there
//!
//! Only the primary branch can fail the run. A DR problem is logged and
//! reported as "no DR image". A failed target-account publish becomes one
//! failed line in the report.

use crate::aws::ec2::{ImageOperations, ImageRequest};
use crate::aws::executor::{ClientFactory, RegionClients};
use crate::aws::sns::{Notifier, send_notification};
use crate::aws::ssm::ParameterOperations;
use crate::config::PromoteConfig;
use crate::wait::{PollConfig, poll_until_terminal};
use ami_pipeline_common::defaults::parameter_description;
use ami_pipeline_common::outcome::render_lines;
use ami_pipeline_common::{Convergence, ImageState, ItemOutcome, PollOutcome};
use anyhow::{Result, bail};
use serde::Serialize;
use tracing::{error, info, warn};

pub const SUCCESS_SUBJECT: &str = "AMI Creation Success";
pub const ERROR_SUBJECT: &str = "AMI Creation Error";

/// Result of a successful promotion run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionReport {
    pub ami_id: String,
    /// `None` when DR replication was disabled or failed
    pub dr_ami_id: Option<String>,
    pub ami_name: String,
    pub region: String,
    pub dr_region: Option<String>,
    pub shared_with: Vec<String>,
    /// One line per discovery-store write, in both regions
    pub publishes: Vec<ItemOutcome>,
}

impl PromotionReport {
    /// Body of the success notification
    pub fn summary(&self) -> String {
        let dr = match (&self.dr_region, &self.dr_ami_id) {
            (Some(region), Some(id)) => format!("DR ({region}): {id}"),
            (Some(region), None) => format!("DR ({region}): Failed/Skipped"),
            (None, _) => "DR: Failed/Skipped".to_string(),
        };
        let shared = if self.shared_with.is_empty() {
            "none".to_string()
        } else {
            self.shared_with.join(", ")
        };

        format!(
            "Golden Image AMI Created Successfully!\n\n\
             Source ({}): {}\n\
             {dr}\n\
             AMI Name: {}\n\
             Shared with: {shared}\n\n\
             Discovery store updates:\n{}",
            self.region,
            self.ami_id,
            self.ami_name,
            render_lines(&self.publishes),
        )
    }

    /// Whether any target-account publish failed
    pub fn has_failures(&self) -> bool {
        self.publishes.iter().any(ItemOutcome::is_failed)
    }
}

/// Image and publish results for one region
struct RegionPromotion {
    image_id: String,
    publishes: Vec<ItemOutcome>,
}

/// Run the promotion pipeline end to end.
///
/// Sends exactly one notification: a success summary, or the error that
/// stopped the primary branch. The error is also returned.
pub async fn run_promotion<F, N>(
    factory: &F,
    notifier: &N,
    config: &PromoteConfig,
) -> Result<PromotionReport>
where
    F: ClientFactory,
    N: Notifier,
{
    info!(
        instance_id = %config.instance_id,
        ami_name = %config.ami_name,
        region = %config.region,
        "Starting AMI promotion"
    );

    let primary = match promote_primary(factory, config).await {
        Ok(primary) => primary,
        Err(e) => {
            error!(error = ?e, "Critical error in primary AMI promotion");
            send_notification(
                notifier,
                config.sns_topic_arn.as_deref(),
                ERROR_SUBJECT,
                &format!("Error creating AMI: {e:#}"),
            )
            .await;
            return Err(e);
        }
    };

    let dr = match &config.dr_region {
        Some(dr_region) => replicate_to_dr(factory, config, dr_region, &primary.image_id).await,
        None => {
            info!("DR replication disabled");
            None
        }
    };

    let mut publishes = primary.publishes;
    let dr_ami_id = dr.map(|dr| {
        publishes.extend(dr.publishes);
        dr.image_id
    });

    let report = PromotionReport {
        ami_id: primary.image_id,
        dr_ami_id,
        ami_name: config.ami_name.clone(),
        region: config.region.clone(),
        dr_region: config.dr_region.clone(),
        shared_with: config.share_accounts.clone(),
        publishes,
    };

    info!(
        ami_id = %report.ami_id,
        dr_ami_id = ?report.dr_ami_id,
        "AMI promotion complete"
    );
    send_notification(
        notifier,
        config.sns_topic_arn.as_deref(),
        SUCCESS_SUBJECT,
        &report.summary(),
    )
    .await;

    Ok(report)
}

fn image_request(config: &PromoteConfig) -> ImageRequest {
    ImageRequest::new(
        &config.instance_id,
        &config.ami_name,
        &config.ami_description,
    )
}

async fn promote_primary<F: ClientFactory>(
    factory: &F,
    config: &PromoteConfig,
) -> Result<RegionPromotion> {
    let clients = factory.ambient(&config.region).await?;

    let image_id = clients.images().create_image(&image_request(config)).await?;
    info!(image_id = %image_id, "Created AMI, waiting for it to become available");

    let outcome = wait_for_image(clients.images(), &image_id, &config.poll).await?;
    if !outcome.is_available() {
        bail!("Primary AMI {image_id} creation failed: {outcome}");
    }

    let publishes = share_and_publish(factory, &clients, config, &image_id).await?;
    Ok(RegionPromotion {
        image_id,
        publishes,
    })
}

/// DR branch; every failure is contained here
async fn replicate_to_dr<F: ClientFactory>(
    factory: &F,
    config: &PromoteConfig,
    dr_region: &str,
    source_image_id: &str,
) -> Option<RegionPromotion> {
    match try_replicate(factory, config, dr_region, source_image_id).await {
        Ok(dr) => dr,
        Err(e) => {
            error!(dr_region = %dr_region, error = ?e, "Error in DR replication");
            None
        }
    }
}

async fn try_replicate<F: ClientFactory>(
    factory: &F,
    config: &PromoteConfig,
    dr_region: &str,
    source_image_id: &str,
) -> Result<Option<RegionPromotion>> {
    info!(dr_region = %dr_region, source_image_id = %source_image_id, "Copying AMI to DR region");
    let clients = factory.ambient(dr_region).await?;

    let image_id = clients
        .images()
        .copy_image(source_image_id, &config.region, &image_request(config))
        .await?;

    let outcome = wait_for_image(clients.images(), &image_id, &config.poll).await?;
    if !outcome.is_available() {
        warn!(image_id = %image_id, %outcome, "DR AMI copy did not become available");
        return Ok(None);
    }

    let publishes = share_and_publish(factory, &clients, config, &image_id).await?;
    Ok(Some(RegionPromotion {
        image_id,
        publishes,
    }))
}

async fn wait_for_image<I: ImageOperations>(
    images: &I,
    image_id: &str,
    poll: &PollConfig,
) -> Result<PollOutcome> {
    poll_until_terminal(
        poll,
        image_id,
        || images.describe_image_state(image_id),
        |state: &Option<ImageState>| state.map_or(Convergence::Missing, ImageState::convergence),
    )
    .await
}

/// Share the image and publish its id in this region.
///
/// Sharing and the owning account's write are fatal to the branch; target
/// account writes are not.
async fn share_and_publish<F: ClientFactory>(
    factory: &F,
    clients: &F::Clients,
    config: &PromoteConfig,
    image_id: &str,
) -> Result<Vec<ItemOutcome>> {
    let region = clients.region();

    if !config.share_accounts.is_empty() {
        clients
            .images()
            .share_image(image_id, &config.share_accounts)
            .await?;
        info!(image_id = %image_id, accounts = ?config.share_accounts, "Shared AMI");
    }

    let description = parameter_description(&config.ami_name);
    clients
        .parameters()
        .put_parameter(&config.parameter_name, image_id, &description)
        .await?;
    info!(parameter = %config.parameter_name, image_id = %image_id, region = %region, "Updated discovery store in source account");

    let mut publishes = vec![ItemOutcome::ok(
        "source",
        format!("{} = {image_id} in source account ({region})", config.parameter_name),
    )];
    publishes.extend(publish_to_targets(factory, config, region, image_id, &description).await);
    Ok(publishes)
}

async fn publish_to_targets<F: ClientFactory>(
    factory: &F,
    config: &PromoteConfig,
    region: &str,
    image_id: &str,
    description: &str,
) -> Vec<ItemOutcome> {
    let Some(role_name) = config.target_role_name.as_deref() else {
        if !config.share_accounts.is_empty() {
            info!("No target role configured, skipping target account publishing");
        }
        return Vec::new();
    };

    let mut outcomes = Vec::with_capacity(config.share_accounts.len());
    for account_id in &config.share_accounts {
        info!(account_id = %account_id, region = %region, "Updating discovery store in target account");

        let result: Result<()> = async {
            let clients = factory.resolve(account_id, Some(role_name), region).await?;
            clients
                .parameters()
                .put_parameter(&config.parameter_name, image_id, description)
                .await
        }
        .await;

        outcomes.push(match result {
            Ok(()) => ItemOutcome::ok(
                account_id,
                format!("{} = {image_id} in {account_id} ({region})", config.parameter_name),
            ),
            Err(e) => {
                error!(account_id = %account_id, region = %region, error = ?e, "Failed to update discovery store in target account");
                ItemOutcome::failed(account_id, format!("{account_id} ({region}): {e:#}"))
            }
        });
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PromoteRequest;
    use crate::testing::{FakeCloud, RecordingNotifier};
    use ami_pipeline_common::OutcomeKind;
    use std::time::Duration;

    const OWN: &str = "000000000000";
    const PRIMARY: &str = "ap-south-1";
    const DR: &str = "ap-south-2";
    const TOPIC: &str = "arn:aws:sns:ap-south-1:000000000000:golden";

    fn config(accounts: &str, dr: bool) -> PromoteConfig {
        PromoteRequest {
            instance_id: Some("i-abc".to_string()),
            parameter_name: Some("golden-ami".to_string()),
            ami_name: Some("golden-image-1700000000".to_string()),
            share_accounts: Some(accounts.to_string()),
            sns_topic_arn: Some(TOPIC.to_string()),
            ..Default::default()
        }
        .into_config(
            PRIMARY,
            dr.then(|| DR.to_string()),
            PollConfig::new(Duration::from_secs(30), Duration::from_secs(1800)),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_promotes_into_both_regions() {
        let cloud = FakeCloud::new(OWN);
        let notifier = RecordingNotifier::default();
        cloud.script_images(PRIMARY, &[Some(ImageState::Pending), Some(ImageState::Available)]);

        let report = run_promotion(&cloud, &notifier, &config("", true))
            .await
            .unwrap();

        let dr_id = report.dr_ami_id.clone().expect("DR image");
        assert_ne!(report.ami_id, dr_id);
        assert_eq!(cloud.parameter(OWN, PRIMARY, "golden-ami"), Some(report.ami_id.clone()));
        assert_eq!(cloud.parameter(OWN, DR, "golden-ami"), Some(dr_id.clone()));
        assert!(cloud.world().shares.is_empty());

        let world = cloud.world();
        let copy = &world.images[&dr_id];
        assert_eq!(copy.source, Some((report.ami_id.clone(), PRIMARY.to_string())));
        assert_eq!(copy.request.instance_id, "i-abc");
        drop(world);

        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        let (subject, body) = &messages[0];
        assert_eq!(subject, SUCCESS_SUBJECT);
        assert!(body.contains(&report.ami_id));
        assert!(body.contains(&dr_id));
        assert!(body.contains("golden-image-1700000000"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_primary_publishes_nothing() {
        for script in [
            vec![Some(ImageState::Failed)],
            vec![None],
            vec![Some(ImageState::Pending)],
        ] {
            let cloud = FakeCloud::new(OWN);
            let notifier = RecordingNotifier::default();
            cloud.script_images(PRIMARY, &script);

            let err = run_promotion(&cloud, &notifier, &config("111111111111", true))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("creation failed"), "{err:#}");

            let world = cloud.world();
            assert!(world.parameters.is_empty());
            assert!(world.shares.is_empty());
            assert!(world.images_in(DR).is_empty());
            drop(world);

            let messages = notifier.messages();
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].0, ERROR_SUBJECT);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_failure_is_reported() {
        let cloud = FakeCloud::new(OWN);
        let notifier = RecordingNotifier::default();
        cloud.world().fail_create = true;

        assert!(run_promotion(&cloud, &notifier, &config("", true)).await.is_err());
        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, ERROR_SUBJECT);
        assert!(messages[0].1.contains("CreateImage failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_share_failure_stops_before_publishing() {
        let cloud = FakeCloud::new(OWN);
        let notifier = RecordingNotifier::default();
        cloud.world().fail_share.insert(PRIMARY.to_string());

        assert!(run_promotion(&cloud, &notifier, &config("111111111111", false))
            .await
            .is_err());
        assert_eq!(cloud.parameter(OWN, PRIMARY, "golden-ami"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_describe_error_fails_primary() {
        let cloud = FakeCloud::new(OWN);
        let notifier = RecordingNotifier::default();
        cloud.world().fail_describe.insert(PRIMARY.to_string());

        assert!(run_promotion(&cloud, &notifier, &config("", false)).await.is_err());
        assert!(cloud.world().parameters.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dr_copy_failure_keeps_primary() {
        let cloud = FakeCloud::new(OWN);
        let notifier = RecordingNotifier::default();
        cloud.world().fail_copy = true;

        let report = run_promotion(&cloud, &notifier, &config("", true))
            .await
            .unwrap();
        assert_eq!(report.dr_ami_id, None);
        assert_eq!(cloud.parameter(OWN, PRIMARY, "golden-ami"), Some(report.ami_id.clone()));
        assert_eq!(cloud.parameter(OWN, DR, "golden-ami"), None);

        let (subject, body) = &notifier.messages()[0];
        assert_eq!(subject, SUCCESS_SUBJECT);
        assert!(body.contains("DR (ap-south-2): Failed/Skipped"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_dr_copy_is_absent() {
        let cloud = FakeCloud::new(OWN);
        let notifier = RecordingNotifier::default();
        cloud.script_images(DR, &[Some(ImageState::Pending), Some(ImageState::Failed)]);

        let report = run_promotion(&cloud, &notifier, &config("111111111111", true))
            .await
            .unwrap();
        assert_eq!(report.dr_ami_id, None);
        assert_eq!(cloud.parameter(OWN, DR, "golden-ami"), None);
        assert_eq!(cloud.parameter("111111111111", DR, "golden-ami"), None);
        assert_eq!(
            cloud.parameter("111111111111", PRIMARY, "golden-ami"),
            Some(report.ami_id.clone())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dr_publish_failure_keeps_primary() {
        let cloud = FakeCloud::new(OWN);
        let notifier = RecordingNotifier::default();
        cloud
            .world()
            .fail_put
            .insert((OWN.to_string(), DR.to_string()));

        let report = run_promotion(&cloud, &notifier, &config("", true))
            .await
            .unwrap();
        assert_eq!(report.dr_ami_id, None);
        assert!(cloud.parameter(OWN, PRIMARY, "golden-ami").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dr_share_failure_keeps_primary() {
        let cloud = FakeCloud::new(OWN);
        let notifier = RecordingNotifier::default();
        cloud.world().fail_share.insert(DR.to_string());

        let report = run_promotion(&cloud, &notifier, &config("111111111111", true))
            .await
            .unwrap();
        assert_eq!(report.dr_ami_id, None);
        assert_eq!(cloud.parameter(OWN, PRIMARY, "golden-ami"), Some(report.ami_id.clone()));
        assert_eq!(
            cloud.parameter("111111111111", PRIMARY, "golden-ami"),
            Some(report.ami_id.clone())
        );
        assert_eq!(cloud.parameter(OWN, DR, "golden-ami"), None);
        assert_eq!(cloud.parameter("111111111111", DR, "golden-ami"), None);
        assert!(report.publishes.iter().all(|p| !p.message.contains(DR)));

        let (subject, body) = &notifier.messages()[0];
        assert_eq!(subject, SUCCESS_SUBJECT);
        assert!(body.contains("DR (ap-south-2): Failed/Skipped"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dr_describe_error_keeps_primary() {
        let cloud = FakeCloud::new(OWN);
        let notifier = RecordingNotifier::default();
        cloud.world().fail_describe.insert(DR.to_string());

        let report = run_promotion(&cloud, &notifier, &config("", true))
            .await
            .unwrap();
        assert_eq!(report.dr_ami_id, None);
        assert_eq!(cloud.parameter(OWN, PRIMARY, "golden-ami"), Some(report.ami_id.clone()));
        assert_eq!(cloud.parameter(OWN, DR, "golden-ami"), None);
        // the copy was requested before the state check failed
        assert_eq!(cloud.world().images_in(DR).len(), 1);

        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, SUCCESS_SUBJECT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_account_is_isolated_in_dr_region() {
        let cloud = FakeCloud::new(OWN);
        let notifier = RecordingNotifier::default();
        cloud.world().fail_assume.insert("222222222222".to_string());

        let report = run_promotion(
            &cloud,
            &notifier,
            &config("111111111111,222222222222,333333333333", true),
        )
        .await
        .unwrap();

        let dr_id = report.dr_ami_id.clone().expect("DR image");
        assert_eq!(cloud.parameter("111111111111", DR, "golden-ami"), Some(dr_id.clone()));
        assert_eq!(cloud.parameter("222222222222", DR, "golden-ami"), None);
        assert_eq!(cloud.parameter("333333333333", DR, "golden-ami"), Some(dr_id));
        assert_eq!(cloud.parameter(OWN, DR, "golden-ami"), report.dr_ami_id);

        // four lines per region: source plus three targets
        assert_eq!(report.publishes.len(), 8);
        let failed: Vec<&str> = report
            .publishes
            .iter()
            .filter(|p| p.is_failed())
            .map(|p| p.message.as_str())
            .collect();
        assert_eq!(failed.len(), 2);
        assert!(failed[0].starts_with("222222222222 (ap-south-1)"));
        assert!(failed[1].starts_with("222222222222 (ap-south-2)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failing_account_does_not_stop_the_others() {
        let cloud = FakeCloud::new(OWN);
        let notifier = RecordingNotifier::default();
        cloud.world().fail_assume.insert("222222222222".to_string());

        let report = run_promotion(
            &cloud,
            &notifier,
            &config("111111111111,222222222222,333333333333", false),
        )
        .await
        .unwrap();

        let kinds: Vec<(&str, OutcomeKind)> = report
            .publishes
            .iter()
            .map(|p| (p.item.as_str(), p.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("source", OutcomeKind::Ok),
                ("111111111111", OutcomeKind::Ok),
                ("222222222222", OutcomeKind::Failed),
                ("333333333333", OutcomeKind::Ok),
            ]
        );
        assert!(report.has_failures());
        assert!(cloud.parameter("111111111111", PRIMARY, "golden-ami").is_some());
        assert!(cloud.parameter("222222222222", PRIMARY, "golden-ami").is_none());
        assert!(cloud.parameter("333333333333", PRIMARY, "golden-ami").is_some());

        // one batched share call
        let world = cloud.world();
        assert_eq!(world.shares.len(), 1);
        assert_eq!(world.shares[0].1.len(), 3);
        drop(world);

        let (_, body) = &notifier.messages()[0];
        assert!(body.contains("[FAILED] 222222222222"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_account_in_targets_is_written_without_role() {
        let cloud = FakeCloud::new(OWN);
        let notifier = RecordingNotifier::default();

        run_promotion(&cloud, &notifier, &config(OWN, false))
            .await
            .unwrap();
        assert!(cloud.world().assumed.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_role_skips_target_publishing() {
        let cloud = FakeCloud::new(OWN);
        let notifier = RecordingNotifier::default();
        let mut config = config("111111111111", false);
        config.target_role_name = None;

        let report = run_promotion(&cloud, &notifier, &config).await.unwrap();
        assert_eq!(report.publishes.len(), 1);
        assert_eq!(cloud.parameter("111111111111", PRIMARY, "golden-ami"), None);
        // still shared
        assert_eq!(cloud.world().shares.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_topic_sends_nothing() {
        let cloud = FakeCloud::new(OWN);
        let notifier = RecordingNotifier::default();
        let mut config = config("", false);
        config.sns_topic_arn = None;

        run_promotion(&cloud, &notifier, &config).await.unwrap();
        assert!(notifier.messages().is_empty());
    }

    #[test]
    fn test_summary_without_dr() {
        let report = PromotionReport {
            ami_id: "ami-1".to_string(),
            dr_ami_id: None,
            ami_name: "golden".to_string(),
            region: PRIMARY.to_string(),
            dr_region: None,
            shared_with: Vec::new(),
            publishes: vec![ItemOutcome::ok("source", "golden-ami = ami-1")],
        };
        let summary = report.summary();
        assert!(summary.contains("Source (ap-south-1): ami-1"));
        assert!(summary.contains("DR: Failed/Skipped"));
        assert!(summary.contains("Shared with: none"));
        assert!(summary.contains("[OK] golden-ami = ami-1"));
    }
}
