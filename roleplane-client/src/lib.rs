pub mod features;
pub mod shared;

pub use features::cluster_operations::repo::{ClusterTransport, GrpcTransport};
pub use features::cluster_operations::service::ClusterOperations;
pub use shared::error::{ClientError, ClientResult, TransportError};
pub use shared::wait::POLL_INTERVAL;
