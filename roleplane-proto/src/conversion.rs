use crate::v1;
use roleplane_core::{ClusterNode, CoreError, RoleInstance, RoleState};

// ClusterNode
impl From<ClusterNode> for v1::RoleInstanceState {
    fn from(node: ClusterNode) -> Self {
        Self {
            name: node.name,
            command: node.command,
            diagnostics: node.diagnostics,
            role: node.role,
            uuid: node.uuid,
            environment: node.environment,
            output: node.output,
            role_id: node.role_id,
            state: node.state.into(),
            exit_code: node.exit_code,
        }
    }
}

impl TryFrom<v1::RoleInstanceState> for ClusterNode {
    type Error = CoreError;

    fn try_from(state: v1::RoleInstanceState) -> Result<Self, Self::Error> {
        Ok(Self {
            name: state.name,
            command: state.command,
            diagnostics: state.diagnostics,
            role: state.role,
            uuid: state.uuid,
            environment: state.environment,
            output: state.output,
            role_id: state.role_id,
            state: RoleState::try_from(state.state)?,
            exit_code: state.exit_code,
        })
    }
}

impl From<&ClusterNode> for v1::RoleInstanceState {
    fn from(node: &ClusterNode) -> Self {
        node.clone().into()
    }
}

// RoleInstance
impl From<&RoleInstance> for v1::RoleInstanceState {
    fn from(instance: &RoleInstance) -> Self {
        instance.to_wire_format().into()
    }
}
