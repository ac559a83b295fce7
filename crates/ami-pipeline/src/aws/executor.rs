//! Cross-account client resolution
//!
//! The pipelines never hold global clients. Whenever they need to act in a
//! region, or as another account, they ask a [`ClientFactory`] for a fresh
//! set of [`RegionClients`]. Each resolution is independent: a failure to
//! assume a role affects only the account it was made for.

use crate::aws::account::{AccountId, get_current_account_id, role_arn};
use crate::aws::context::AwsContext;
use crate::aws::ec2::{Ec2Client, ImageOperations, LaunchTemplateOperations};
use crate::aws::eks::{EksClient, NodeGroupOperations};
use crate::aws::ssm::{ParameterOperations, SsmClient};
use anyhow::{Context, Result};
use aws_sdk_sts::config::Credentials;
use tracing::{info, warn};

/// Service clients scoped to one account and region
pub trait RegionClients {
    type Images: ImageOperations;
    type Templates: LaunchTemplateOperations;
    type Parameters: ParameterOperations;
    type NodeGroups: NodeGroupOperations;

    fn region(&self) -> &str;
    fn images(&self) -> &Self::Images;
    fn launch_templates(&self) -> &Self::Templates;
    fn parameters(&self) -> &Self::Parameters;
    fn node_groups(&self) -> &Self::NodeGroups;
}

/// Produces scoped clients for the caller's own account or a target account
#[allow(async_fn_in_trait)]
pub trait ClientFactory {
    type Clients: RegionClients;

    /// Clients acting with the caller's own identity
    async fn ambient(&self, region: &str) -> Result<Self::Clients>;

    /// Clients acting in `account_id`.
    ///
    /// Falls back to [`ClientFactory::ambient`] when `account_id` is the
    /// caller's own account or no role name is given.
    async fn resolve(
        &self,
        account_id: &str,
        role_name: Option<&str>,
        region: &str,
    ) -> Result<Self::Clients>;
}

/// Real AWS clients for one scope
pub struct AwsClients {
    region: String,
    ec2: Ec2Client,
    ssm: SsmClient,
    eks: EksClient,
}

impl AwsClients {
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            region: ctx.region().to_string(),
            ec2: Ec2Client::from_context(ctx),
            ssm: SsmClient::from_context(ctx),
            eks: EksClient::from_context(ctx),
        }
    }
}

impl RegionClients for AwsClients {
    type Images = Ec2Client;
    type Templates = Ec2Client;
    type Parameters = SsmClient;
    type NodeGroups = EksClient;

    fn region(&self) -> &str {
        &self.region
    }

    fn images(&self) -> &Ec2Client {
        &self.ec2
    }

    fn launch_templates(&self) -> &Ec2Client {
        &self.ec2
    }

    fn parameters(&self) -> &SsmClient {
        &self.ssm
    }

    fn node_groups(&self) -> &EksClient {
        &self.eks
    }
}

/// Role to assume for `account_id`, or `None` to use the ambient identity.
///
/// No role name (or an empty one) and the caller's own account both mean
/// no delegation.
pub fn delegation_role<'a>(
    caller: Option<&AccountId>,
    account_id: &str,
    role_name: Option<&'a str>,
) -> Option<&'a str> {
    let role_name = role_name.filter(|r| !r.is_empty())?;
    if caller.is_some_and(|c| c.as_str() == account_id) {
        return None;
    }
    Some(role_name)
}

/// Resolves clients via STS AssumeRole
pub struct CrossAccountExecutor {
    base: AwsContext,
    caller: Option<AccountId>,
    session_name: String,
}

impl CrossAccountExecutor {
    /// Load the ambient configuration and look up the caller's account.
    ///
    /// An unknown caller account is tolerated; every role-bearing request
    /// then assumes the role, even for the caller's own account.
    pub async fn new(region: &str, session_name: &str) -> Self {
        let base = AwsContext::new(region).await;
        let caller = match get_current_account_id(base.sdk_config()).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = ?e, "Could not determine current account ID");
                None
            }
        };

        Self {
            base,
            caller,
            session_name: session_name.to_string(),
        }
    }

    pub fn caller_account(&self) -> Option<&AccountId> {
        self.caller.as_ref()
    }

    /// Ambient context in `region`
    pub fn ambient_context(&self, region: &str) -> AwsContext {
        self.base.with_region(region)
    }

    /// Context acting in `account_id`/`region`, assuming `role_name` if needed
    pub async fn context_for(
        &self,
        account_id: &str,
        role_name: Option<&str>,
        region: &str,
    ) -> Result<AwsContext> {
        let Some(role_name) = delegation_role(self.caller.as_ref(), account_id, role_name) else {
            info!(account_id = %account_id, region = %region, "Using local credentials (same account)");
            return Ok(self.ambient_context(region));
        };

        let role_arn = role_arn(account_id, role_name);
        info!(role_arn = %role_arn, region = %region, "Assuming role");

        let response = self
            .base
            .sts_client()
            .assume_role()
            .role_arn(&role_arn)
            .role_session_name(&self.session_name)
            .send()
            .await
            .with_context(|| format!("Failed to assume role {role_arn}"))?;

        let creds = response
            .credentials()
            .with_context(|| format!("AssumeRole for {role_arn} returned no credentials"))?;

        let credentials = Credentials::new(
            creds.access_key_id(),
            creds.secret_access_key(),
            Some(creds.session_token().to_string()),
            None,
            "ami-pipeline-assume-role",
        );

        Ok(AwsContext::with_credentials(region, credentials).await)
    }
}

impl ClientFactory for CrossAccountExecutor {
    type Clients = AwsClients;

    async fn ambient(&self, region: &str) -> Result<AwsClients> {
        Ok(AwsClients::from_context(&self.ambient_context(region)))
    }

    async fn resolve(
        &self,
        account_id: &str,
        role_name: Option<&str>,
        region: &str,
    ) -> Result<AwsClients> {
        let ctx = self.context_for(account_id, role_name, region).await?;
        Ok(AwsClients::from_context(&ctx))
    }
}
