//! ami-pipeline: golden AMI promotion and EKS node group patching
//!
//! `promote` builds an image from an instance, shares it and publishes its
//! id; `patch` rolls a cluster's node groups onto the published image;
//! `watch` follows one rollout until it settles.

use ami_pipeline::aws::{CrossAccountExecutor, SnsNotifier, classify_anyhow_error};
use ami_pipeline::config::{self, PatchRequest, PromoteRequest, WatchConfig};
use ami_pipeline::wait::PollConfig;
use ami_pipeline::{patch, promote, watch};
use ami_pipeline_common::PollOutcome;
use ami_pipeline_common::defaults::{
    DEFAULT_DR_REGION, DEFAULT_PRIMARY_REGION, DEFAULT_TARGET_ROLE_NAME, IMAGE_TIMEOUT_SECS,
    PATCH_SESSION_NAME, POLL_INTERVAL_SECS, PROMOTE_SESSION_NAME, WATCH_TIMEOUT_SECS,
};
use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Applied when RUST_LOG is unset
const DEFAULT_LOG_FILTER: &str =
    "info,aws_config=warn,aws_smithy_runtime=warn,aws_smithy_runtime_api=warn,aws_sdk_sts=warn";

#[derive(Parser, Debug)]
#[command(name = "ami-pipeline")]
#[command(about = "Golden AMI promotion and EKS node group patching")]
#[command(version)]
struct Args {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

/// Arguments for the promote command
#[derive(clap::Args, Debug)]
struct PromoteArgs {
    /// Request payload, inline JSON or a path to a JSON file.
    /// Its fields take precedence over flags and environment.
    #[arg(long)]
    event: Option<String>,

    /// Instance to build the image from
    #[arg(long, env = "INSTANCE_ID")]
    instance_id: Option<String>,

    /// Discovery key the image id is published under
    #[arg(long, env = "PARAMETER_NAME")]
    parameter_name: Option<String>,

    /// Image name (default: golden-image-<unix time>)
    #[arg(long, env = "AMI_NAME")]
    ami_name: Option<String>,

    #[arg(long, env = "AMI_DESCRIPTION")]
    ami_description: Option<String>,

    /// Comma-separated accounts to share with and publish to
    #[arg(long, env = "SHARE_ACCOUNTS")]
    share_accounts: Option<String>,

    /// Role assumed in target accounts; empty disables target publishing
    #[arg(long, env = "TARGET_ROLE_NAME")]
    target_role_name: Option<String>,

    #[arg(long, env = "SNS_TOPIC_ARN")]
    sns_topic_arn: Option<String>,

    #[arg(long, env = "AWS_REGION", default_value = DEFAULT_PRIMARY_REGION)]
    region: String,

    #[arg(long, env = "DR_REGION", default_value = DEFAULT_DR_REGION)]
    dr_region: String,

    /// Skip the copy into the DR region
    #[arg(long)]
    no_dr: bool,

    /// Seconds between image state checks
    #[arg(long, default_value_t = POLL_INTERVAL_SECS)]
    poll_interval: u64,

    /// Seconds to wait for an image before giving up
    #[arg(long, default_value_t = IMAGE_TIMEOUT_SECS)]
    timeout: u64,
}

impl PromoteArgs {
    fn request(&self) -> PromoteRequest {
        PromoteRequest {
            instance_id: self.instance_id.clone(),
            parameter_name: self.parameter_name.clone(),
            ami_name: self.ami_name.clone(),
            ami_description: self.ami_description.clone(),
            share_accounts: self.share_accounts.clone(),
            target_role_name: self.target_role_name.clone(),
            sns_topic_arn: self.sns_topic_arn.clone(),
        }
    }
}

/// Arguments for the patch command
#[derive(clap::Args, Debug)]
struct PatchArgs {
    /// Request payload, inline JSON or a path to a JSON file.
    /// Its fields take precedence over flags and environment.
    #[arg(long)]
    event: Option<String>,

    /// Account owning the cluster
    #[arg(long, env = "ACCOUNT_ID")]
    account_id: Option<String>,

    #[arg(long, env = "CLUSTER_NAME")]
    cluster_name: Option<String>,

    /// Discovery key to read (default: eks-ami/<cluster>)
    #[arg(long, env = "PARAMETER_NAME")]
    parameter_name: Option<String>,

    /// Role assumed in the cluster's account
    #[arg(long, env = "TARGET_ROLE_NAME")]
    target_role_name: Option<String>,

    #[arg(long, env = "SNS_TOPIC_ARN")]
    sns_topic_arn: Option<String>,

    #[arg(long, env = "AWS_REGION", default_value = DEFAULT_PRIMARY_REGION)]
    region: String,

    /// Decide per node group without creating versions or triggering updates
    #[arg(long)]
    dry_run: bool,
}

impl PatchArgs {
    fn request(&self) -> PatchRequest {
        PatchRequest {
            account_id: self.account_id.clone(),
            cluster_name: self.cluster_name.clone(),
            parameter_name: self.parameter_name.clone(),
            target_role_name: self.target_role_name.clone(),
            sns_topic_arn: self.sns_topic_arn.clone(),
        }
    }
}

/// Arguments for the watch command
#[derive(clap::Args, Debug)]
struct WatchArgs {
    #[arg(long, env = "CLUSTER_NAME")]
    cluster_name: String,

    #[arg(long)]
    nodegroup_name: String,

    /// Update id printed by `patch`
    #[arg(long)]
    update_id: Option<String>,

    /// Account owning the cluster (default: the caller's)
    #[arg(long, env = "ACCOUNT_ID")]
    account_id: Option<String>,

    #[arg(long, env = "TARGET_ROLE_NAME")]
    target_role_name: Option<String>,

    #[arg(long, env = "AWS_REGION", default_value = DEFAULT_PRIMARY_REGION)]
    region: String,

    /// Do not read node readiness through the local kubeconfig
    #[arg(long)]
    skip_node_readiness: bool,

    /// Seconds between ticks
    #[arg(long, default_value_t = POLL_INTERVAL_SECS)]
    interval: u64,

    /// Seconds to watch before giving up
    #[arg(long, default_value_t = WATCH_TIMEOUT_SECS)]
    timeout: u64,
}

impl From<WatchArgs> for WatchConfig {
    fn from(args: WatchArgs) -> Self {
        Self {
            cluster_name: args.cluster_name,
            node_group: args.nodegroup_name,
            update_id: args.update_id,
            account_id: args.account_id,
            target_role_name: match args.target_role_name {
                None => Some(DEFAULT_TARGET_ROLE_NAME.to_string()),
                Some(role) if role.is_empty() => None,
                role => role,
            },
            region: args.region,
            node_readiness: !args.skip_node_readiness,
            poll: PollConfig::new(
                Duration::from_secs(args.interval),
                Duration::from_secs(args.timeout),
            ),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build, share and publish a golden image from an instance
    Promote(Box<PromoteArgs>),

    /// Roll a cluster's node groups onto its published image
    Patch(PatchArgs),

    /// Follow a node group rollout until it settles
    Watch(WatchArgs),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if let Some(hint) = classify_anyhow_error(e).suggestion() {
        let _ = writeln!(stderr, "\n\x1b[36mHint:\x1b[0m {hint}");
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    } else {
        let backtrace = e.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            let _ = writeln!(stderr, "\n\x1b[2mBacktrace:\x1b[0m\n{backtrace}");
        }
    }
}

/// Logs go to stderr so reports on stdout stay machine-readable
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Payload fields, or an empty request when no payload was given
fn load_payload<T: DeserializeOwned + Default>(event: Option<&str>) -> Result<T> {
    Ok(match event {
        Some(event) => config::load_event(event)?,
        None => T::default(),
    })
}

async fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    match args.command {
        Command::Promote(args) => {
            let payload: PromoteRequest = load_payload(args.event.as_deref())?;
            let poll = PollConfig::new(
                Duration::from_secs(args.poll_interval),
                Duration::from_secs(args.timeout),
            );
            let dr_region = (!args.no_dr).then(|| args.dr_region.clone());
            let config = payload
                .or(args.request())
                .into_config(args.region.clone(), dr_region, poll)?;

            let executor = CrossAccountExecutor::new(&config.region, PROMOTE_SESSION_NAME).await;
            let notifier = SnsNotifier::from_context(&executor.ambient_context(&config.region));

            let report = promote::run_promotion(&executor, &notifier, &config).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Patch(args) => {
            let payload: PatchRequest = load_payload(args.event.as_deref())?;
            let config = payload
                .or(args.request())
                .into_config(args.region.clone(), args.dry_run)?;

            let executor = CrossAccountExecutor::new(&config.region, PATCH_SESSION_NAME).await;
            let notifier = SnsNotifier::from_context(&executor.ambient_context(&config.region));

            let report = patch::run_patch(&executor, &notifier, &config).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Watch(args) => {
            let config = WatchConfig::from(args);
            info!(
                cluster = %config.cluster_name,
                node_group = %config.node_group,
                update_id = ?config.update_id,
                "Watching rollout"
            );

            let executor = CrossAccountExecutor::new(&config.region, PATCH_SESSION_NAME).await;
            match watch::run_watch(&executor, &config).await? {
                Some(PollOutcome::Available) => println!("Rollout complete"),
                Some(outcome) => bail!("Rollout of {} did not converge: {outcome}", config.node_group),
                None => println!("Stopped"),
            }
        }
    }

    Ok(())
}
