pub mod description;
pub mod instance;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use description::{ClusterDescription, DescriptorCodec, DescriptorError, JsonDescriptorCodec};
pub use instance::{ClusterNode, RoleInstance, UNALLOCATED_INSTANCE};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("State regression for {uuid}: {from} -> {to}")]
    StateRegression {
        uuid: String,
        from: RoleState,
        to: RoleState,
    },
    #[error("Invalid role state: {0}")]
    InvalidState(i32),
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Lifecycle state shared by role instances and whole clusters.
///
/// The declaration order is the lifecycle order, and the protocol compares
/// states with `>=` rather than equality: a role that has gone past `Live`
/// into a terminal state still counts as having reached `Live`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RoleState {
    #[default]
    Uninitialized,
    Created,
    Requested,
    Allocated,
    Live,
    Stopped,
    Failed,
    Destroyed,
}

impl RoleState {
    pub const ALL: [RoleState; 8] = [
        RoleState::Uninitialized,
        RoleState::Created,
        RoleState::Requested,
        RoleState::Allocated,
        RoleState::Live,
        RoleState::Stopped,
        RoleState::Failed,
        RoleState::Destroyed,
    ];

    /// Wire integer for this state.
    pub fn code(self) -> i32 {
        match self {
            RoleState::Uninitialized => 0,
            RoleState::Created => 1,
            RoleState::Requested => 2,
            RoleState::Allocated => 3,
            RoleState::Live => 4,
            RoleState::Stopped => 5,
            RoleState::Failed => 6,
            RoleState::Destroyed => 7,
        }
    }

    /// True once the instance has stopped, failed or been destroyed; exit
    /// codes are only meaningful from here on.
    pub fn is_terminal(self) -> bool {
        self >= RoleState::Stopped
    }
}

impl TryFrom<i32> for RoleState {
    type Error = CoreError;

    fn try_from(code: i32) -> Result<Self> {
        RoleState::ALL
            .into_iter()
            .find(|state| state.code() == code)
            .ok_or(CoreError::InvalidState(code))
    }
}

impl From<RoleState> for i32 {
    fn from(state: RoleState) -> Self {
        state.code()
    }
}

impl fmt::Display for RoleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoleState::Uninitialized => "uninitialized",
            RoleState::Created => "created",
            RoleState::Requested => "requested",
            RoleState::Allocated => "allocated",
            RoleState::Live => "live",
            RoleState::Stopped => "stopped",
            RoleState::Failed => "failed",
            RoleState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
