use crate::features::cluster_operations::repo::ClusterTransport;
use crate::shared::error::{ClientError, ClientResult};
use crate::shared::wait::{poll_until_deadline, PollError, Probe, POLL_INTERVAL};
use roleplane_core::{
    ClusterDescription, ClusterNode, DescriptorCodec, JsonDescriptorCodec, RoleState,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What a single poll of a role saw.
#[derive(Debug)]
struct RoleObservation {
    instances_found: usize,
    last_instance: Option<ClusterNode>,
}

/// Cluster operations at a slightly higher level than the raw protocol.
///
/// Holds no mutable state of its own: every call is an independent exchange
/// with the controller, so one instance can be shared between tasks.
#[derive(Clone)]
pub struct ClusterOperations {
    transport: Arc<dyn ClusterTransport>,
    codec: Arc<dyn DescriptorCodec>,
}

impl ClusterOperations {
    pub fn new(transport: Arc<dyn ClusterTransport>) -> Self {
        Self {
            transport,
            codec: Arc::new(JsonDescriptorCodec),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn DescriptorCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Fetch a single instance by uuid.
    pub async fn get_instance(&self, uuid: &str) -> ClientResult<ClusterNode> {
        let node = self
            .transport
            .get_node(uuid)
            .await?
            .ok_or_else(|| ClientError::NotFound(uuid.to_string()))?;

        Ok(ClusterNode::try_from(node)?)
    }

    /// List the uuids of every instance in a role; `""` lists all roles.
    /// No ordering is implied.
    pub async fn list_instance_identifiers(&self, role: &str) -> ClientResult<Vec<String>> {
        Ok(self.transport.list_node_uuids_by_role(role).await?)
    }

    /// List the details of every instance in a role.
    ///
    /// Two independent round trips: instances released between the listing
    /// and the detail fetch are silently missing from the result, which can
    /// therefore be shorter than the uuid list.
    pub async fn list_instances_by_role(&self, role: &str) -> ClientResult<Vec<ClusterNode>> {
        let uuids = self.list_instance_identifiers(role).await?;
        let listed = uuids.len();
        let nodes = self.list_instances(uuids).await?;

        if nodes.len() < listed {
            debug!(
                role,
                listed,
                resolved = nodes.len(),
                "Some instances disappeared between listing and detail fetch"
            );
        }

        Ok(nodes)
    }

    /// Fetch the details of the given uuids. Uuids the controller can no
    /// longer resolve are left out rather than reported as errors.
    pub async fn list_instances(&self, uuids: Vec<String>) -> ClientResult<Vec<ClusterNode>> {
        self.transport
            .get_cluster_nodes(uuids)
            .await?
            .into_iter()
            .map(|node| ClusterNode::try_from(node).map_err(ClientError::from))
            .collect()
    }

    /// Fetch and parse the controller's current cluster description.
    pub async fn get_cluster_descriptor(&self) -> ClientResult<ClusterDescription> {
        let raw = self.transport.get_json_cluster_status().await?;

        match self.codec.parse(&raw) {
            Ok(description) => Ok(description),
            Err(source) => {
                error!(error = %source, payload = %raw, "Failed to parse cluster description");
                Err(ClientError::MalformedSnapshot { raw, source })
            }
        }
    }

    /// Submit a complete desired-state description. `true` only means the
    /// controller accepted it for later reconciliation; poll to observe
    /// convergence.
    pub async fn resize(&self, desired: &ClusterDescription) -> ClientResult<bool> {
        let cluster_spec = self.codec.serialize(desired).map_err(ClientError::Encode)?;

        let accepted = self.transport.flex_cluster(cluster_spec).await?;
        info!(cluster = %desired.name, accepted, "Resize request submitted");

        Ok(accepted)
    }

    /// Wait for an instance of `role` to be live or past it in the lifecycle.
    ///
    /// Polls once per second. Each poll lists the role and inspects the
    /// first uuid returned; the wait succeeds as soon as that instance's
    /// state is `>= Live`, which includes instances that have already
    /// stopped or failed. Transport failures end the wait immediately.
    pub async fn wait_for_role_live(
        &self,
        role: &str,
        timeout: Duration,
    ) -> ClientResult<RoleState> {
        info!(role, timeout_ms = timeout.as_millis() as u64, "Waiting for a live instance");

        let result =
            poll_until_deadline(POLL_INTERVAL, timeout, move || self.probe_role(role)).await;

        match result {
            Ok(state) => {
                info!(role, %state, "Role instance reached live");
                Ok(state)
            }
            Err(PollError::Probe(error)) => Err(error),
            Err(PollError::Expired { elapsed, last }) => {
                warn!(
                    role,
                    elapsed_ms = elapsed.as_millis() as u64,
                    instances_found = last.instances_found,
                    "Timed out waiting for a live instance"
                );
                Err(ClientError::WaitTimeout {
                    elapsed,
                    role: role.to_string(),
                    instances_found: last.instances_found,
                    last_instance: last.last_instance.map(Box::new),
                })
            }
        }
    }

    async fn probe_role(&self, role: &str) -> ClientResult<Probe<RoleState, RoleObservation>> {
        let uuids = self.list_instance_identifiers(role).await?;

        let Some(first) = uuids.first() else {
            debug!(role, "No instances yet");
            return Ok(Probe::Pending(RoleObservation {
                instances_found: 0,
                last_instance: None,
            }));
        };

        let instance = self.get_instance(first).await?;
        debug!(role, uuid = %first, state = %instance.state, "Polled role instance");

        if instance.state >= RoleState::Live {
            return Ok(Probe::Ready(instance.state));
        }

        Ok(Probe::Pending(RoleObservation {
            instances_found: uuids.len(),
            last_instance: Some(instance),
        }))
    }
}
