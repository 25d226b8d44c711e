//! Resize handling
//!
//! A flex request carries the complete desired cluster description. The
//! service keeps the latest one and brings the instance directory in line
//! with it: missing instances are requested, surplus ones released, newest
//! first. Roles that vanish from the description are scaled to zero.

use crate::features::instance_directory::service::InstanceDirectoryService;
use crate::shared::error::{ControllerError, ControllerResult};
use roleplane_core::description::ROLE_INSTANCES;
use roleplane_core::{now_millis, ClusterDescription, RoleState};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Largest instance count a single role may ask for.
pub const MAX_ROLE_INSTANCES: u32 = 4096;

struct FlexState {
    desired: ClusterDescription,
    /// Role ids in order of first appearance, starting at 1.
    role_ids: BTreeMap<String, i32>,
}

impl FlexState {
    fn role_id(&mut self, role: &str) -> i32 {
        let next = self.role_ids.len() as i32 + 1;
        *self.role_ids.entry(role.to_string()).or_insert(next)
    }
}

pub struct FlexService {
    directory: Arc<InstanceDirectoryService>,
    state: Mutex<FlexState>,
}

impl FlexService {
    pub fn new(directory: Arc<InstanceDirectoryService>, cluster_name: impl Into<String>) -> Self {
        let mut desired = ClusterDescription::new(cluster_name);
        desired.state = RoleState::Live;
        desired.create_time = now_millis();

        Self {
            directory,
            state: Mutex::new(FlexState {
                desired,
                role_ids: BTreeMap::new(),
            }),
        }
    }

    fn validate(desired: &ClusterDescription) -> ControllerResult<()> {
        if desired.name.trim().is_empty() {
            return Err(ControllerError::InvalidSpec(
                "Cluster name cannot be empty".to_string(),
            ));
        }

        for (role, options) in &desired.roles {
            if role.is_empty() {
                return Err(ControllerError::InvalidSpec(
                    "Role name cannot be empty".to_string(),
                ));
            }
            if let Some(value) = options.get(ROLE_INSTANCES) {
                let count = value.trim().parse::<u32>().map_err(|_| {
                    ControllerError::InvalidSpec(format!(
                        "Role '{role}' has an invalid instance count: {value}"
                    ))
                })?;
                if count > MAX_ROLE_INSTANCES {
                    return Err(ControllerError::InvalidSpec(format!(
                        "Role '{role}' asks for {count} instances; the limit is {MAX_ROLE_INSTANCES}"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Accept `desired` as the new target and reconcile the directory
    /// against it. Returns true once the request has been accepted.
    pub async fn flex(&self, desired: ClusterDescription) -> ControllerResult<bool> {
        Self::validate(&desired)?;

        let mut state = self.state.lock().await;

        let mut roles: BTreeSet<String> = desired.roles.keys().cloned().collect();
        for instance in self.directory.list_by_role("").await? {
            if let Some(role) = instance.role() {
                roles.insert(role.to_string());
            }
        }

        for role in &roles {
            let role_id = state.role_id(role);
            self.reconcile_role(role, role_id, desired.desired_instances(role))
                .await?;
        }

        let create_time = state.desired.create_time;
        let cluster_state = state.desired.state;
        state.desired = ClusterDescription {
            state: cluster_state,
            create_time,
            update_time: now_millis(),
            instances: BTreeMap::new(),
            ..desired
        };

        info!(cluster = %state.desired.name, roles = roles.len(), "Flex request accepted");
        Ok(true)
    }

    async fn reconcile_role(&self, role: &str, role_id: i32, desired: u32) -> ControllerResult<()> {
        let active: Vec<_> = self
            .directory
            .list_by_role(role)
            .await?
            .into_iter()
            .filter(|instance| !instance.is_released())
            .collect();
        let desired = desired as usize;

        if active.len() < desired {
            let missing = desired - active.len();
            info!(role = %role, role_id, missing, "Requesting instances");
            for _ in 0..missing {
                self.directory.allocate(role, role_id).await?;
            }
        } else if active.len() > desired {
            let surplus = active.len() - desired;
            info!(role = %role, role_id, surplus, "Releasing instances");
            for instance in active.iter().rev().take(surplus) {
                if let Some(uuid) = instance.uuid() {
                    self.directory.release(uuid).await?;
                }
            }
        }

        Ok(())
    }

    /// The latest accepted description with the current directory contents
    /// filled in.
    pub async fn cluster_status(&self) -> ControllerResult<ClusterDescription> {
        let state = self.state.lock().await;
        let snapshot = self.directory.snapshot(&state.desired.name).await?;

        Ok(ClusterDescription {
            update_time: snapshot.update_time,
            instances: snapshot.instances,
            status: snapshot.status,
            ..state.desired.clone()
        })
    }

    pub async fn role_id(&self, role: &str) -> Option<i32> {
        self.state.lock().await.role_ids.get(role).copied()
    }
}
