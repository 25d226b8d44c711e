use crate::shared::error::{ControllerError, ControllerResult};
use std::net::SocketAddr;

pub const DEFAULT_ADDR: &str = "127.0.0.1:50061";
pub const DEFAULT_CLUSTER: &str = "cluster";

/// Controller settings, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub bind_addr: SocketAddr,
    pub cluster_name: String,
}

impl ControllerConfig {
    /// `ROLEPLANE_ADDR` and `ROLEPLANE_CLUSTER`, with defaults for unset
    /// variables.
    pub fn from_env() -> ControllerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ControllerResult<Self> {
        let addr = lookup("ROLEPLANE_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let bind_addr = addr
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| ControllerError::Config(format!("ROLEPLANE_ADDR '{addr}': {e}")))?;

        let cluster_name = lookup("ROLEPLANE_CLUSTER")
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_CLUSTER.to_string());

        Ok(Self {
            bind_addr,
            cluster_name,
        })
    }
}
