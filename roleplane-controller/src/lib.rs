//! Roleplane controller
//!
//! Owns the authoritative instance directory and serves the cluster protocol
//! that `roleplane-client` talks to.

pub mod config;
pub mod features;
pub mod rpc_service;
pub mod server;
pub mod shared;

pub use config::ControllerConfig;
pub use rpc_service::{Endpoint, GrpcEndpoint, RpcService, ServiceState};
pub use server::ControllerServer;
pub use shared::error::{ControllerError, ControllerResult, LifecycleError};
