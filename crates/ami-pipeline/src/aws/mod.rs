//! AWS client modules
//!
//! This module provides wrappers around AWS SDK clients for:
//! - EC2: Image creation, sharing and copy; launch template versions
//! - SSM: Parameter Store as the discovery store
//! - EKS: Managed node group status and updates
//! - SNS: Run notifications
//! - STS: Account ID lookup and cross-account role assumption
//! - Auto Scaling: Group membership for the rollout observer

pub mod account;
pub mod autoscaling;
pub mod context;
pub mod ec2;
pub mod eks;
pub mod error;
pub mod executor;
pub mod sns;
pub mod ssm;

pub use account::{AccountId, get_current_account_id};
pub use context::AwsContext;
pub use ec2::{Ec2Client, ImageOperations, ImageRequest, LaunchTemplateOperations, LaunchTemplateRef};
pub use eks::{EksClient, NodeGroupInfo, NodeGroupOperations};
pub use executor::{AwsClients, ClientFactory, CrossAccountExecutor, RegionClients};
pub use sns::{Notifier, SnsNotifier, send_notification};
pub use ssm::{ParameterOperations, SsmClient};

// Error handling
pub use error::{AwsError, classify_anyhow_error, classify_aws_error};
