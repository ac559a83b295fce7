//! In-memory cloud for pipeline tests
//!
//! One [`FakeCloud`] holds every account and region. Clients handed out by
//! it carry the account and region they were resolved for, so tests can
//! check exactly where a parameter was written or an image was created.

use crate::aws::account::AccountId;
use crate::aws::ec2::{ImageOperations, ImageRequest, LaunchTemplateOperations, LaunchTemplateRef};
use crate::aws::eks::{NodeGroupInfo, NodeGroupOperations};
use crate::aws::error::AwsError;
use crate::aws::executor::{ClientFactory, RegionClients, delegation_role};
use crate::aws::sns::Notifier;
use crate::aws::ssm::ParameterOperations;
use ami_pipeline_common::{ImageState, NodePoolStatus};
use anyhow::{Result, bail};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
pub struct FakeImage {
    pub region: String,
    pub request: ImageRequest,
    /// Copied from, if this image is a cross-region copy
    pub source: Option<(String, String)>,
    states: VecDeque<Option<ImageState>>,
}

#[derive(Debug, Default)]
pub struct World {
    next_id: u32,

    /// States reported for the next image created in a region. The last
    /// state repeats forever; unscripted regions report AVAILABLE.
    pub image_scripts: HashMap<String, Vec<Option<ImageState>>>,
    pub images: HashMap<String, FakeImage>,
    pub fail_create: bool,
    pub fail_copy: bool,
    /// Regions where describing an image errors
    pub fail_describe: HashSet<String>,
    /// Regions where sharing errors
    pub fail_share: HashSet<String>,
    pub shares: Vec<(String, Vec<String>)>,

    /// (account, region, name) -> value
    pub parameters: HashMap<(String, String, String), String>,
    /// (account, region) pairs where writes fail
    pub fail_put: HashSet<(String, String)>,
    /// Accounts whose role cannot be assumed
    pub fail_assume: HashSet<String>,
    /// Accounts resolved through a role, in order
    pub assumed: Vec<(String, String)>,

    /// cluster -> node groups, in listing order
    pub node_groups: HashMap<String, Vec<NodeGroupInfo>>,
    pub fail_list: bool,
    /// Node groups whose describe call errors
    pub fail_describe_pool: HashSet<String>,
    /// Node groups that report an update already in progress
    pub busy_pools: HashSet<String>,
    pub template_images: HashMap<LaunchTemplateRef, String>,
    pub fail_template_lookup: bool,
    pub created_versions: Vec<(LaunchTemplateRef, String)>,
    /// (cluster, node group, template) per triggered update
    pub updates: Vec<(String, String, LaunchTemplateRef)>,
}

impl World {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:08x}", self.next_id)
    }

    fn register_image(
        &mut self,
        region: &str,
        request: &ImageRequest,
        source: Option<(String, String)>,
    ) -> String {
        let id = self.next_id("ami");
        let states = self
            .image_scripts
            .get(region)
            .cloned()
            .unwrap_or_else(|| vec![Some(ImageState::Available)]);
        self.images.insert(
            id.clone(),
            FakeImage {
                region: region.to_string(),
                request: request.clone(),
                source,
                states: states.into(),
            },
        );
        id
    }

    /// Images that exist in `region`
    pub fn images_in(&self, region: &str) -> Vec<&FakeImage> {
        self.images.values().filter(|i| i.region == region).collect()
    }
}

/// Shared fake cloud; also the [`ClientFactory`] the pipelines are given
#[derive(Clone)]
pub struct FakeCloud {
    world: Arc<Mutex<World>>,
    own_account: String,
}

impl FakeCloud {
    pub fn new(own_account: &str) -> Self {
        Self {
            world: Arc::default(),
            own_account: own_account.to_string(),
        }
    }

    pub fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap()
    }

    /// Script the states of the next image created in `region`
    pub fn script_images(&self, region: &str, states: &[Option<ImageState>]) {
        self.world()
            .image_scripts
            .insert(region.to_string(), states.to_vec());
    }

    pub fn parameter(&self, account: &str, region: &str, name: &str) -> Option<String> {
        self.world()
            .parameters
            .get(&(account.to_string(), region.to_string(), name.to_string()))
            .cloned()
    }

    pub fn set_parameter(&self, account: &str, region: &str, name: &str, value: &str) {
        self.world().parameters.insert(
            (account.to_string(), region.to_string(), name.to_string()),
            value.to_string(),
        );
    }

    /// Add a node group pinned to `template_id` version 1, whose launch
    /// template currently references `image_id`.
    pub fn add_node_group(
        &self,
        cluster: &str,
        name: &str,
        status: NodePoolStatus,
        template_id: &str,
        image_id: &str,
    ) {
        let template = LaunchTemplateRef::new(template_id, "1");
        let mut world = self.world();
        world
            .template_images
            .insert(template.clone(), image_id.to_string());
        world
            .node_groups
            .entry(cluster.to_string())
            .or_default()
            .push(NodeGroupInfo {
                name: name.to_string(),
                status,
                launch_template: Some(template),
                autoscaling_groups: vec![format!("eks-{name}-asg")],
                desired_size: Some(2),
            });
    }

    fn clients(&self, account: &str, region: &str) -> FakeClients {
        FakeClients {
            world: Arc::clone(&self.world),
            account: account.to_string(),
            region: region.to_string(),
        }
    }
}

impl ClientFactory for FakeCloud {
    type Clients = FakeClients;

    async fn ambient(&self, region: &str) -> Result<FakeClients> {
        Ok(self.clients(&self.own_account, region))
    }

    async fn resolve(
        &self,
        account_id: &str,
        role_name: Option<&str>,
        region: &str,
    ) -> Result<FakeClients> {
        let caller = AccountId::new(&self.own_account);
        if let Some(role) = delegation_role(Some(&caller), account_id, role_name) {
            let mut world = self.world();
            if world.fail_assume.contains(account_id) {
                return Err(AwsError::AccessDenied {
                    message: format!("cannot assume {role} in {account_id}"),
                }
                .into());
            }
            world
                .assumed
                .push((account_id.to_string(), role.to_string()));
        }
        Ok(self.clients(account_id, region))
    }
}

/// Clients bound to one account and region of a [`FakeCloud`]
pub struct FakeClients {
    world: Arc<Mutex<World>>,
    account: String,
    region: String,
}

impl FakeClients {
    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap()
    }
}

impl RegionClients for FakeClients {
    type Images = Self;
    type Templates = Self;
    type Parameters = Self;
    type NodeGroups = Self;

    fn region(&self) -> &str {
        &self.region
    }

    fn images(&self) -> &Self {
        self
    }

    fn launch_templates(&self) -> &Self {
        self
    }

    fn parameters(&self) -> &Self {
        self
    }

    fn node_groups(&self) -> &Self {
        self
    }
}

impl ImageOperations for FakeClients {
    async fn create_image(&self, request: &ImageRequest) -> Result<String> {
        let mut world = self.world();
        if world.fail_create {
            bail!("CreateImage failed for {}", request.instance_id);
        }
        Ok(world.register_image(&self.region, request, None))
    }

    async fn describe_image_state(&self, image_id: &str) -> Result<Option<ImageState>> {
        let mut world = self.world();
        if world.fail_describe.contains(&self.region) {
            bail!("DescribeImages failed in {}", self.region);
        }
        let Some(image) = world.images.get_mut(image_id) else {
            return Ok(None);
        };
        if image.states.len() > 1 {
            Ok(image.states.pop_front().flatten())
        } else {
            Ok(image.states.front().copied().flatten())
        }
    }

    async fn share_image(&self, image_id: &str, account_ids: &[String]) -> Result<()> {
        let mut world = self.world();
        if world.fail_share.contains(&self.region) {
            bail!("ModifyImageAttribute failed for {image_id}");
        }
        world.shares.push((image_id.to_string(), account_ids.to_vec()));
        Ok(())
    }

    async fn copy_image(
        &self,
        source_image_id: &str,
        source_region: &str,
        request: &ImageRequest,
    ) -> Result<String> {
        let mut world = self.world();
        if world.fail_copy {
            bail!("CopyImage failed for {source_image_id}");
        }
        let source = Some((source_image_id.to_string(), source_region.to_string()));
        Ok(world.register_image(&self.region, request, source))
    }
}

impl ParameterOperations for FakeClients {
    async fn put_parameter(&self, name: &str, value: &str, _description: &str) -> Result<()> {
        let mut world = self.world();
        if world
            .fail_put
            .contains(&(self.account.clone(), self.region.clone()))
        {
            bail!("PutParameter failed in {} ({})", self.account, self.region);
        }
        world.parameters.insert(
            (self.account.clone(), self.region.clone(), name.to_string()),
            value.to_string(),
        );
        Ok(())
    }

    async fn get_parameter(&self, name: &str) -> Result<String> {
        let world = self.world();
        world
            .parameters
            .get(&(self.account.clone(), self.region.clone(), name.to_string()))
            .cloned()
            .ok_or_else(|| {
                AwsError::NotFound {
                    resource_type: "parameter",
                    resource_id: name.to_string(),
                }
                .into()
            })
    }
}

impl LaunchTemplateOperations for FakeClients {
    async fn template_image_id(&self, template: &LaunchTemplateRef) -> Result<Option<String>> {
        let world = self.world();
        if world.fail_template_lookup {
            bail!("DescribeLaunchTemplateVersions failed for {template}");
        }
        Ok(world.template_images.get(template).cloned())
    }

    async fn create_template_version(
        &self,
        template: &LaunchTemplateRef,
        image_id: &str,
    ) -> Result<String> {
        let mut world = self.world();
        let version = (world.created_versions.len() + 2).to_string();
        world
            .created_versions
            .push((template.clone(), image_id.to_string()));
        world.template_images.insert(
            LaunchTemplateRef::new(&template.id, &version),
            image_id.to_string(),
        );
        Ok(version)
    }
}

impl NodeGroupOperations for FakeClients {
    async fn list_node_groups(&self, cluster: &str) -> Result<Vec<String>> {
        let world = self.world();
        if world.fail_list {
            bail!("ListNodegroups failed for {cluster}");
        }
        Ok(world
            .node_groups
            .get(cluster)
            .map(|groups| groups.iter().map(|g| g.name.clone()).collect())
            .unwrap_or_default())
    }

    async fn describe_node_group(&self, cluster: &str, node_group: &str) -> Result<NodeGroupInfo> {
        let world = self.world();
        if world.fail_describe_pool.contains(node_group) {
            bail!("DescribeNodegroup failed for {node_group}");
        }
        world
            .node_groups
            .get(cluster)
            .and_then(|groups| groups.iter().find(|g| g.name == node_group))
            .cloned()
            .ok_or_else(|| {
                AwsError::NotFound {
                    resource_type: "nodegroup",
                    resource_id: node_group.to_string(),
                }
                .into()
            })
    }

    async fn update_node_group_version(
        &self,
        cluster: &str,
        node_group: &str,
        template: &LaunchTemplateRef,
    ) -> Result<String> {
        let mut world = self.world();
        if world.busy_pools.contains(node_group) {
            return Err(AwsError::Conflict {
                message: format!("Nodegroup {node_group} is already being updated"),
            }
            .into());
        }
        world.updates.push((
            cluster.to_string(),
            node_group.to_string(),
            template.clone(),
        ));
        Ok(format!("update-{}", world.updates.len()))
    }
}

/// Notifier that records every publish
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingNotifier {
    /// (subject, body) of every notification, in order
    pub fn messages(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, subject, body)| (subject.clone(), body.clone()))
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    async fn publish(&self, topic_arn: &str, subject: &str, body: &str) -> Result<()> {
        self.sent.lock().unwrap().push((
            topic_arn.to_string(),
            subject.to_string(),
            body.to_string(),
        ));
        Ok(())
    }
}
