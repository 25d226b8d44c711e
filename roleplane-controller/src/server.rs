use crate::features::cluster_flex::service::FlexService;
use crate::features::instance_directory::service::InstanceDirectoryService;
use crate::shared::error::ControllerError;
use roleplane_core::{CoreError, DescriptorCodec};
use roleplane_proto::v1::cluster_protocol_server::ClusterProtocol;
use roleplane_proto::v1::{
    FlexClusterRequest, FlexClusterResponse, GetClusterNodesRequest, GetClusterNodesResponse,
    GetJsonClusterStatusRequest, GetJsonClusterStatusResponse, GetNodeRequest, GetNodeResponse,
    ListNodeUuidsByRoleRequest, ListNodeUuidsByRoleResponse, RoleInstanceState,
};
use std::sync::Arc;
use tonic::{Request, Response, Status};

#[derive(Clone)]
pub struct ControllerServer {
    directory: Arc<InstanceDirectoryService>,
    flex: Arc<FlexService>,
    codec: Arc<dyn DescriptorCodec>,
}

impl ControllerServer {
    pub fn new(
        directory: Arc<InstanceDirectoryService>,
        flex: Arc<FlexService>,
        codec: Arc<dyn DescriptorCodec>,
    ) -> Self {
        Self {
            directory,
            flex,
            codec,
        }
    }
}

fn descriptor_status(error: roleplane_core::DescriptorError) -> Status {
    ControllerError::Core(CoreError::Descriptor(error)).into()
}

#[tonic::async_trait]
impl ClusterProtocol for ControllerServer {
    async fn get_node(
        &self,
        request: Request<GetNodeRequest>,
    ) -> Result<Response<GetNodeResponse>, Status> {
        let req = request.into_inner();
        let instance = self.directory.get(&req.uuid).await?;

        Ok(Response::new(GetNodeResponse {
            cluster_node: Some(RoleInstanceState::from(&instance)),
        }))
    }

    async fn list_node_uuids_by_role(
        &self,
        request: Request<ListNodeUuidsByRoleRequest>,
    ) -> Result<Response<ListNodeUuidsByRoleResponse>, Status> {
        let req = request.into_inner();
        let uuid = self.directory.list_uuids_by_role(&req.role).await?;

        tracing::debug!(role = %req.role, count = uuid.len(), "Listed instance uuids");

        Ok(Response::new(ListNodeUuidsByRoleResponse { uuid }))
    }

    async fn get_cluster_nodes(
        &self,
        request: Request<GetClusterNodesRequest>,
    ) -> Result<Response<GetClusterNodesResponse>, Status> {
        let req = request.into_inner();
        let instances = self.directory.get_many(&req.uuid).await?;

        Ok(Response::new(GetClusterNodesResponse {
            cluster_node: instances.iter().map(RoleInstanceState::from).collect(),
        }))
    }

    async fn get_json_cluster_status(
        &self,
        _request: Request<GetJsonClusterStatusRequest>,
    ) -> Result<Response<GetJsonClusterStatusResponse>, Status> {
        let description = self.flex.cluster_status().await?;
        let cluster_spec = self
            .codec
            .serialize(&description)
            .map_err(|e| Status::internal(e.to_string()))?;

        Ok(Response::new(GetJsonClusterStatusResponse { cluster_spec }))
    }

    async fn flex_cluster(
        &self,
        request: Request<FlexClusterRequest>,
    ) -> Result<Response<FlexClusterResponse>, Status> {
        let req = request.into_inner();
        let desired = self
            .codec
            .parse(&req.cluster_spec)
            .map_err(descriptor_status)?;

        tracing::info!(cluster = %desired.name, "Received flex request");
        let response = self.flex.flex(desired).await?;

        Ok(Response::new(FlexClusterResponse { response }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::instance_directory::repo::InMemoryInstanceRepository;
    use roleplane_core::{ClusterDescription, ClusterNode, JsonDescriptorCodec, RoleState};

    fn create_server() -> (ControllerServer, Arc<InstanceDirectoryService>) {
        let repo = Arc::new(InMemoryInstanceRepository::new());
        let directory = Arc::new(InstanceDirectoryService::new(repo));
        let flex = Arc::new(FlexService::new(directory.clone(), "test-cluster"));
        let server = ControllerServer::new(directory.clone(), flex, Arc::new(JsonDescriptorCodec));
        (server, directory)
    }

    #[tokio::test]
    async fn test_get_node_returns_wire_projection() {
        let (server, directory) = create_server();
        let instance = directory.allocate("worker", 1).await.unwrap();
        let uuid = instance.uuid().unwrap().to_string();
        directory.assign_container(&uuid, "container_01").await.unwrap();

        let response = server
            .get_node(Request::new(GetNodeRequest { uuid: uuid.clone() }))
            .await
            .unwrap()
            .into_inner();

        let node = ClusterNode::try_from(response.cluster_node.unwrap()).unwrap();
        assert_eq!(node.uuid.as_deref(), Some(uuid.as_str()));
        assert_eq!(node.name, "container_01");
        assert_eq!(node.role.as_deref(), Some("worker"));
        assert_eq!(node.state, RoleState::Allocated);
        assert_eq!(node.command, None);
    }

    #[tokio::test]
    async fn test_get_node_unknown_uuid_is_not_found() {
        let (server, _) = create_server();

        let status = server
            .get_node(Request::new(GetNodeRequest {
                uuid: "missing".to_string(),
            }))
            .await
            .unwrap_err();

        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn test_get_node_empty_uuid_is_not_found() {
        let (server, _) = create_server();

        let status = server
            .get_node(Request::new(GetNodeRequest {
                uuid: String::new(),
            }))
            .await
            .unwrap_err();

        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn test_get_cluster_nodes_omits_completed_instances() {
        let (server, directory) = create_server();
        let u1 = directory.allocate("worker", 1).await.unwrap().uuid().unwrap().to_string();
        let u2 = directory.allocate("worker", 1).await.unwrap().uuid().unwrap().to_string();
        directory.record_exit(&u2, 0, None).await.unwrap();

        let response = server
            .get_cluster_nodes(Request::new(GetClusterNodesRequest {
                uuid: vec![u1.clone(), u2],
            }))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.cluster_node.len(), 1);
        assert_eq!(response.cluster_node[0].uuid.as_deref(), Some(u1.as_str()));
    }

    #[tokio::test]
    async fn test_flex_then_status() {
        let (server, _) = create_server();
        let codec = JsonDescriptorCodec;
        let mut desired = ClusterDescription::new("test-cluster");
        desired.set_desired_instances("worker", 2);

        let accepted = server
            .flex_cluster(Request::new(FlexClusterRequest {
                cluster_spec: codec.serialize(&desired).unwrap(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(accepted.response);

        let uuids = server
            .list_node_uuids_by_role(Request::new(ListNodeUuidsByRoleRequest {
                role: "worker".to_string(),
            }))
            .await
            .unwrap()
            .into_inner()
            .uuid;
        assert_eq!(uuids.len(), 2);

        let status = server
            .get_json_cluster_status(Request::new(GetJsonClusterStatusRequest {}))
            .await
            .unwrap()
            .into_inner();
        let description = codec.parse(&status.cluster_spec).unwrap();
        assert_eq!(description.desired_instances("worker"), 2);
        assert_eq!(description.instances["worker"], uuids);
    }

    #[tokio::test]
    async fn test_flex_malformed_spec_is_invalid_argument() {
        let (server, _) = create_server();

        let status = server
            .flex_cluster(Request::new(FlexClusterRequest {
                cluster_spec: "{\"name\":".to_string(),
            }))
            .await
            .unwrap_err();

        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }
}
