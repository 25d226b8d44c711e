use crate::rpc_service::ServiceState;
use roleplane_core::CoreError;
use thiserror::Error;

/// Controller specific errors
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),
    #[error("Invalid cluster specification: {0}")]
    InvalidSpec(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<ControllerError> for tonic::Status {
    fn from(err: ControllerError) -> Self {
        match err {
            ControllerError::InstanceNotFound(uuid) => {
                tonic::Status::not_found(format!("Instance not found: {uuid}"))
            }
            ControllerError::InvalidSpec(msg) => tonic::Status::invalid_argument(msg),
            ControllerError::Core(CoreError::Descriptor(e)) => {
                tonic::Status::invalid_argument(e.to_string())
            }
            other => tonic::Status::internal(other.to_string()),
        }
    }
}

pub type ControllerResult<T> = std::result::Result<T, ControllerError>;

/// Errors raised while binding or unbinding the protocol endpoint.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Service is not ready (state: {0})")]
    NotReady(ServiceState),
    #[error("Invalid service transition: {from} -> {to}")]
    InvalidTransition { from: ServiceState, to: ServiceState },
    #[error("No endpoint bound to the service")]
    NoEndpoint,
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Endpoint failure: {0}")]
    Endpoint(String),
}
