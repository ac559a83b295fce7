//! Notification channel

use crate::aws::context::AwsContext;
use anyhow::{Context, Result};
use tracing::{debug, error, info};

/// SNS rejects subjects longer than this
const MAX_SUBJECT_LEN: usize = 100;

/// Delivers a human-readable run summary
#[allow(async_fn_in_trait)]
#[cfg_attr(test, mockall::automock)]
pub trait Notifier {
    async fn publish(&self, topic_arn: &str, subject: &str, body: &str) -> Result<()>;
}

/// SNS-backed notifier
pub struct SnsNotifier {
    client: aws_sdk_sns::Client,
}

impl SnsNotifier {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.sns_client(),
        }
    }
}

impl Notifier for SnsNotifier {
    async fn publish(&self, topic_arn: &str, subject: &str, body: &str) -> Result<()> {
        self.client
            .publish()
            .topic_arn(topic_arn)
            .subject(truncate_subject(subject))
            .message(body)
            .send()
            .await
            .with_context(|| format!("Failed to publish to {topic_arn}"))?;
        Ok(())
    }
}

/// Send a notification if a topic is configured.
///
/// Delivery is advisory: failures are logged and never returned.
pub async fn send_notification<N: Notifier>(
    notifier: &N,
    topic_arn: Option<&str>,
    subject: &str,
    body: &str,
) {
    let Some(topic_arn) = topic_arn else {
        debug!(subject = %subject, "No notification topic configured, skipping");
        return;
    };

    match notifier.publish(topic_arn, subject, body).await {
        Ok(()) => info!(topic_arn = %topic_arn, subject = %subject, "Notification sent"),
        Err(e) => error!(topic_arn = %topic_arn, error = ?e, "Error sending notification"),
    }
}

fn truncate_subject(subject: &str) -> &str {
    match subject.char_indices().nth(MAX_SUBJECT_LEN) {
        Some((idx, _)) => &subject[..idx],
        None => subject,
    }
}
