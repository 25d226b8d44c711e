use roleplane_core::{ClusterNode, CoreError, DescriptorError};
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a `ClusterTransport`. Never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Failed to connect to controller: {0}")]
    Connection(String),
    #[error("Controller call failed ({code:?}): {message}")]
    Rpc { code: tonic::Code, message: String },
}

impl From<tonic::Status> for TransportError {
    fn from(status: tonic::Status) -> Self {
        TransportError::Rpc {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

/// Client specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Instance not found: {0}")]
    NotFound(String),
    #[error("Malformed cluster snapshot: {source}")]
    MalformedSnapshot {
        /// The payload exactly as the controller sent it.
        raw: String,
        #[source]
        source: DescriptorError,
    },
    #[error(
        "Timeout after {}ms waiting for a live instance of role '{role}'; instances found {instances_found}",
        .elapsed.as_millis()
    )]
    WaitTimeout {
        elapsed: Duration,
        role: String,
        instances_found: usize,
        last_instance: Option<Box<ClusterNode>>,
    },
    #[error("Failed to encode cluster description: {0}")]
    Encode(DescriptorError),
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("Invalid wire message: {0}")]
    Decode(#[from] CoreError),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use roleplane_core::RoleInstance;

    #[test]
    fn test_transport_error_from_status() {
        let err: TransportError = tonic::Status::unavailable("connection refused").into();
        assert_eq!(
            err,
            TransportError::Rpc {
                code: tonic::Code::Unavailable,
                message: "connection refused".to_string(),
            }
        );
    }

    #[test]
    fn test_wait_timeout_message() {
        let err = ClientError::WaitTimeout {
            elapsed: Duration::from_millis(2000),
            role: "worker".to_string(),
            instances_found: 0,
            last_instance: None,
        };
        assert_eq!(
            err.to_string(),
            "Timeout after 2000ms waiting for a live instance of role 'worker'; instances found 0"
        );
    }

    #[test]
    fn test_malformed_snapshot_keeps_raw_payload() {
        let err = ClientError::MalformedSnapshot {
            raw: "{\"name\":".to_string(),
            source: DescriptorError::Parse("EOF while parsing".to_string()),
        };
        assert!(err.to_string().contains("Malformed cluster snapshot"));
        assert!(std::error::Error::source(&err).is_some());
        match err {
            ClientError::MalformedSnapshot { raw, .. } => assert_eq!(raw, "{\"name\":"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wait_timeout_carries_snapshot() {
        let mut instance = RoleInstance::new("worker", 1);
        instance.build_identifier();
        let err = ClientError::WaitTimeout {
            elapsed: Duration::from_secs(5),
            role: "worker".to_string(),
            instances_found: 1,
            last_instance: Some(Box::new(instance.to_wire_format())),
        };
        match err {
            ClientError::WaitTimeout { last_instance, .. } => {
                assert_eq!(last_instance.unwrap().uuid.as_deref(), instance.uuid());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_error_conversion() {
        let err: ClientError = CoreError::InvalidState(12).into();
        assert_eq!(err.to_string(), "Invalid wire message: Invalid role state: 12");
    }
}
