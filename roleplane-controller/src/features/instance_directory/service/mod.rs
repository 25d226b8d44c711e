use crate::features::instance_directory::repo::InstanceRepository;
use crate::shared::error::{ControllerError, ControllerResult};
use roleplane_core::{now_millis, ClusterDescription, RoleInstance, RoleState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Authoritative uuid -> instance mapping
pub struct InstanceDirectoryService {
    repo: Arc<dyn InstanceRepository>,
}

impl InstanceDirectoryService {
    pub fn new(repo: Arc<dyn InstanceRepository>) -> Self {
        Self { repo }
    }

    /// Register a new instance of `role` in the `Requested` state.
    pub async fn allocate(&self, role: &str, role_id: i32) -> ControllerResult<RoleInstance> {
        let mut instance = RoleInstance::new(role, role_id);
        instance.build_identifier();
        instance.set_create_time(now_millis());
        instance.advance_state(RoleState::Requested)?;

        self.repo.insert(instance.clone()).await?;

        info!(
            uuid = instance.uuid().unwrap_or_default(),
            role = %role,
            role_id,
            "Instance requested"
        );
        Ok(instance)
    }

    /// Bind an instance to the container that was granted for it.
    pub async fn assign_container(
        &self,
        uuid: &str,
        handle: &str,
    ) -> ControllerResult<RoleInstance> {
        let handle = handle.to_string();
        let instance = self
            .repo
            .update(
                uuid,
                Box::new(move |instance: &mut RoleInstance| -> ControllerResult<()> {
                    instance.advance_state(RoleState::Allocated)?;
                    instance.assign_handle(handle);
                    instance.set_start_time(now_millis());
                    Ok(())
                }),
            )
            .await?;

        info!(uuid = %uuid, handle = instance.handle().unwrap_or_default(), "Container assigned");
        Ok(instance)
    }

    pub async fn update_state(&self, uuid: &str, state: RoleState) -> ControllerResult<RoleInstance> {
        let instance = self
            .repo
            .update(
                uuid,
                Box::new(move |instance: &mut RoleInstance| -> ControllerResult<()> {
                    instance.advance_state(state)?;
                    Ok(())
                }),
            )
            .await?;

        debug!(uuid = %uuid, state = %state, "Instance state updated");
        Ok(instance)
    }

    /// Record the exit of an instance's container and drop it from the
    /// directory. Later lookups of the uuid report it as unknown.
    pub async fn record_exit(
        &self,
        uuid: &str,
        exit_code: i32,
        diagnostics: Option<String>,
    ) -> ControllerResult<RoleInstance> {
        let state = if exit_code == 0 {
            RoleState::Stopped
        } else {
            RoleState::Failed
        };

        let instance = self
            .repo
            .update(
                uuid,
                Box::new(move |instance: &mut RoleInstance| -> ControllerResult<()> {
                    instance.advance_state(state)?;
                    instance.set_exit_code(exit_code);
                    if diagnostics.is_some() {
                        instance.set_diagnostics(diagnostics);
                    }
                    Ok(())
                }),
            )
            .await?;
        self.repo.remove(uuid).await?;

        info!(uuid = %uuid, exit_code, state = %state, "Instance completed");
        Ok(instance)
    }

    /// Mark an instance for termination. Returns false if it was already
    /// released.
    pub async fn release(&self, uuid: &str) -> ControllerResult<bool> {
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        self.repo
            .update(
                uuid,
                Box::new(move |instance: &mut RoleInstance| -> ControllerResult<()> {
                    flag.store(instance.release(), Ordering::SeqCst);
                    Ok(())
                }),
            )
            .await?;

        let released = released.load(Ordering::SeqCst);
        if released {
            info!(uuid = %uuid, "Instance released");
        } else {
            warn!(uuid = %uuid, "Instance was already released");
        }
        Ok(released)
    }

    pub async fn get(&self, uuid: &str) -> ControllerResult<RoleInstance> {
        self.repo
            .get(uuid)
            .await?
            .ok_or_else(|| ControllerError::InstanceNotFound(uuid.to_string()))
    }

    /// Resolve each uuid, skipping those the directory no longer holds.
    pub async fn get_many(&self, uuids: &[String]) -> ControllerResult<Vec<RoleInstance>> {
        let mut instances = Vec::with_capacity(uuids.len());
        for uuid in uuids {
            match self.repo.get(uuid).await? {
                Some(instance) => instances.push(instance),
                None => debug!(uuid = %uuid, "Skipping unknown instance"),
            }
        }
        Ok(instances)
    }

    /// Instances of `role` in allocation order. An empty role selects all.
    pub async fn list_by_role(&self, role: &str) -> ControllerResult<Vec<RoleInstance>> {
        let instances = self.repo.list().await?;
        Ok(instances
            .into_iter()
            .filter(|instance| role.is_empty() || instance.role() == Some(role))
            .collect())
    }

    pub async fn list_uuids_by_role(&self, role: &str) -> ControllerResult<Vec<String>> {
        Ok(self
            .list_by_role(role)
            .await?
            .iter()
            .filter_map(|instance| instance.uuid().map(str::to_string))
            .collect())
    }

    /// A description named `name` whose `instances` map lists every directory
    /// entry by role.
    pub async fn snapshot(&self, name: &str) -> ControllerResult<ClusterDescription> {
        let mut description = ClusterDescription::new(name);
        description.update_time = now_millis();

        for instance in self.repo.list().await? {
            let (Some(role), Some(uuid)) = (instance.role(), instance.uuid()) else {
                continue;
            };
            description
                .instances
                .entry(role.to_string())
                .or_default()
                .push(uuid.to_string());

            let key = format!("{role}.{}", instance.state());
            let count = description
                .status
                .get(&key)
                .and_then(|value| value.parse::<u32>().ok())
                .unwrap_or(0);
            description.status.insert(key, (count + 1).to_string());
        }

        Ok(description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::instance_directory::repo::InMemoryInstanceRepository;

    fn create_test_service() -> InstanceDirectoryService {
        let repo = Arc::new(InMemoryInstanceRepository::new());
        InstanceDirectoryService::new(repo)
    }

    fn uuid_of(instance: &RoleInstance) -> String {
        instance.uuid().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_allocate_builds_identifier_once() {
        let service = create_test_service();

        let instance = service.allocate("worker", 1).await.unwrap();
        let uuid = uuid_of(&instance);

        assert_eq!(instance.state(), RoleState::Requested);
        assert!(instance.create_time().is_some());
        assert_eq!(instance.handle(), None);

        // The identifier survives every later transition.
        service.assign_container(&uuid, "container_01").await.unwrap();
        service.update_state(&uuid, RoleState::Live).await.unwrap();
        let stored = service.get(&uuid).await.unwrap();
        assert_eq!(stored.uuid(), Some(uuid.as_str()));
        assert_eq!(stored.to_wire_format().uuid.as_deref(), Some(uuid.as_str()));
    }

    #[tokio::test]
    async fn test_assign_container_sets_handle_and_start_time() {
        let service = create_test_service();
        let uuid = uuid_of(&service.allocate("worker", 1).await.unwrap());

        let instance = service.assign_container(&uuid, "container_01").await.unwrap();

        assert_eq!(instance.handle(), Some("container_01"));
        assert_eq!(instance.state(), RoleState::Allocated);
        assert!(instance.start_time().is_some());
        assert_eq!(instance.to_wire_format().name, "container_01");
    }

    #[tokio::test]
    async fn test_unallocated_instance_label() {
        let service = create_test_service();
        let uuid = uuid_of(&service.allocate("worker", 1).await.unwrap());

        let node = service.get(&uuid).await.unwrap().to_wire_format();
        assert_eq!(node.name, roleplane_core::UNALLOCATED_INSTANCE);
    }

    #[tokio::test]
    async fn test_update_state_rejects_regression() {
        let service = create_test_service();
        let uuid = uuid_of(&service.allocate("worker", 1).await.unwrap());
        service.update_state(&uuid, RoleState::Live).await.unwrap();

        let result = service.update_state(&uuid, RoleState::Requested).await;
        assert!(matches!(result, Err(ControllerError::Core(_))));
        assert_eq!(service.get(&uuid).await.unwrap().state(), RoleState::Live);
    }

    #[tokio::test]
    async fn test_get_unknown_instance() {
        let service = create_test_service();
        let result = service.get("missing").await;
        assert!(matches!(result, Err(ControllerError::InstanceNotFound(_))));
    }

    #[tokio::test]
    async fn test_release_is_reported_once() {
        let service = create_test_service();
        let uuid = uuid_of(&service.allocate("worker", 1).await.unwrap());

        assert!(service.release(&uuid).await.unwrap());
        assert!(!service.release(&uuid).await.unwrap());

        // Released instances stay listed until their container exits.
        let instance = service.get(&uuid).await.unwrap();
        assert!(instance.is_released());
        assert_eq!(service.list_uuids_by_role("worker").await.unwrap(), vec![uuid]);
    }

    #[tokio::test]
    async fn test_record_exit_removes_instance() {
        let service = create_test_service();
        let uuid = uuid_of(&service.allocate("worker", 1).await.unwrap());
        service.update_state(&uuid, RoleState::Live).await.unwrap();

        let instance = service
            .record_exit(&uuid, 137, Some("killed".to_string()))
            .await
            .unwrap();

        assert_eq!(instance.state(), RoleState::Failed);
        assert_eq!(instance.exit_code(), Some(137));
        assert_eq!(instance.diagnostics(), Some("killed"));
        assert!(matches!(
            service.get(&uuid).await,
            Err(ControllerError::InstanceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_clean_exit_is_stopped() {
        let service = create_test_service();
        let uuid = uuid_of(&service.allocate("worker", 1).await.unwrap());

        let instance = service.record_exit(&uuid, 0, None).await.unwrap();
        assert_eq!(instance.state(), RoleState::Stopped);
        assert_eq!(instance.exit_code(), Some(0));
        assert_eq!(instance.diagnostics(), None);
    }

    #[tokio::test]
    async fn test_get_many_omits_unknown_uuids() {
        let service = create_test_service();
        let u1 = uuid_of(&service.allocate("worker", 1).await.unwrap());
        let u2 = uuid_of(&service.allocate("worker", 1).await.unwrap());
        service.record_exit(&u2, 0, None).await.unwrap();

        let instances = service.get_many(&[u1.clone(), u2]).await.unwrap();

        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].uuid(), Some(u1.as_str()));
    }

    #[tokio::test]
    async fn test_list_uuids_by_role() {
        let service = create_test_service();
        let master = uuid_of(&service.allocate("master", 1).await.unwrap());
        let w1 = uuid_of(&service.allocate("worker", 2).await.unwrap());
        let w2 = uuid_of(&service.allocate("worker", 2).await.unwrap());

        assert_eq!(
            service.list_uuids_by_role("worker").await.unwrap(),
            vec![w1.clone(), w2.clone()]
        );
        assert_eq!(service.list_uuids_by_role("master").await.unwrap(), vec![master.clone()]);
        assert!(service.list_uuids_by_role("unknown").await.unwrap().is_empty());
        assert_eq!(
            service.list_uuids_by_role("").await.unwrap(),
            vec![master, w1, w2]
        );
    }

    #[tokio::test]
    async fn test_snapshot_groups_instances_by_role() {
        let service = create_test_service();
        let master = uuid_of(&service.allocate("master", 1).await.unwrap());
        let w1 = uuid_of(&service.allocate("worker", 2).await.unwrap());
        service.update_state(&w1, RoleState::Live).await.unwrap();
        let w2 = uuid_of(&service.allocate("worker", 2).await.unwrap());

        let description = service.snapshot("test-cluster").await.unwrap();

        assert_eq!(description.name, "test-cluster");
        assert_eq!(description.instances["master"], vec![master]);
        assert_eq!(description.instances["worker"], vec![w1, w2]);
        assert_eq!(description.status["worker.live"], "1");
        assert_eq!(description.status["worker.requested"], "1");
        assert!(description.update_time > 0);
    }
}
