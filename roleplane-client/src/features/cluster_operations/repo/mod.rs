use crate::shared::error::TransportError;
use async_trait::async_trait;
use roleplane_proto::v1;
use roleplane_proto::v1::cluster_protocol_client::ClusterProtocolClient;
use tonic::transport::Channel;
use tonic::Code;

/// One request/response exchange with the controller per call.
///
/// Implementations must not retry: a failure is reported to the caller as
/// soon as it happens.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    /// `Ok(None)` when the controller has no record of the uuid.
    async fn get_node(&self, uuid: &str) -> Result<Option<v1::RoleInstanceState>, TransportError>;

    /// An empty role lists every role.
    async fn list_node_uuids_by_role(&self, role: &str) -> Result<Vec<String>, TransportError>;

    async fn get_cluster_nodes(
        &self,
        uuids: Vec<String>,
    ) -> Result<Vec<v1::RoleInstanceState>, TransportError>;

    async fn get_json_cluster_status(&self) -> Result<String, TransportError>;

    async fn flex_cluster(&self, cluster_spec: String) -> Result<bool, TransportError>;
}

/// gRPC transport over a tonic channel.
#[derive(Clone)]
pub struct GrpcTransport {
    client: ClusterProtocolClient<Channel>,
}

impl GrpcTransport {
    pub async fn connect(controller_addr: &str) -> Result<Self, TransportError> {
        let client = ClusterProtocolClient::connect(controller_addr.to_string())
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(Self { client })
    }

    pub fn new(channel: Channel) -> Self {
        Self {
            client: ClusterProtocolClient::new(channel),
        }
    }
}

#[async_trait]
impl ClusterTransport for GrpcTransport {
    async fn get_node(&self, uuid: &str) -> Result<Option<v1::RoleInstanceState>, TransportError> {
        let mut client = self.client.clone();
        let request = v1::GetNodeRequest {
            uuid: uuid.to_string(),
        };

        match client.get_node(request).await {
            Ok(response) => Ok(response.into_inner().cluster_node),
            Err(status) if status.code() == Code::NotFound => Ok(None),
            Err(status) => Err(status.into()),
        }
    }

    async fn list_node_uuids_by_role(&self, role: &str) -> Result<Vec<String>, TransportError> {
        let mut client = self.client.clone();
        let response = client
            .list_node_uuids_by_role(v1::ListNodeUuidsByRoleRequest {
                role: role.to_string(),
            })
            .await?;

        Ok(response.into_inner().uuid)
    }

    async fn get_cluster_nodes(
        &self,
        uuids: Vec<String>,
    ) -> Result<Vec<v1::RoleInstanceState>, TransportError> {
        let mut client = self.client.clone();
        let response = client
            .get_cluster_nodes(v1::GetClusterNodesRequest { uuid: uuids })
            .await?;

        Ok(response.into_inner().cluster_node)
    }

    async fn get_json_cluster_status(&self) -> Result<String, TransportError> {
        let mut client = self.client.clone();
        let response = client
            .get_json_cluster_status(v1::GetJsonClusterStatusRequest {})
            .await?;

        Ok(response.into_inner().cluster_spec)
    }

    async fn flex_cluster(&self, cluster_spec: String) -> Result<bool, TransportError> {
        let mut client = self.client.clone();
        let response = client
            .flex_cluster(v1::FlexClusterRequest { cluster_spec })
            .await?;

        Ok(response.into_inner().response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_invalid_address() {
        let result = GrpcTransport::connect("not a uri").await;
        assert!(matches!(result, Err(TransportError::Connection(_))));
    }

    #[tokio::test]
    async fn test_mock_transport_reports_missing_node() {
        let mut transport = MockClusterTransport::new();
        transport.expect_get_node().returning(|_| Ok(None));

        assert_eq!(transport.get_node("u1").await.unwrap(), None);
    }
}
