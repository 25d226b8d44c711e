//! Role instance records
//!
//! A `RoleInstance` is the controller's mutable view of one scheduled unit.
//! Clients never see it directly: they get a `ClusterNode`, the projection
//! produced by `RoleInstance::to_wire_format`, which leaves out the
//! scheduling handle.

use crate::{CoreError, Result, RoleState};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Label used in place of the scheduling handle before allocation completes.
pub const UNALLOCATED_INSTANCE: &str = "unallocated instance";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleInstance {
    handle: Option<String>,
    uuid: Option<String>,
    create_time: Option<i64>,
    start_time: Option<i64>,
    released: bool,
    role: Option<String>,
    role_id: i32,
    state: RoleState,
    exit_code: i32,
    command: Option<String>,
    diagnostics: Option<String>,
    output: Option<Vec<String>>,
    environment: Option<Vec<String>>,
}

impl RoleInstance {
    pub fn new(role: impl Into<String>, role_id: i32) -> Self {
        Self {
            role: Some(role.into()),
            role_id,
            ..Self::default()
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    /// Generate and assign the client-facing uuid.
    ///
    /// Must be called exactly once per instance, before the instance is first
    /// externalized. The entity does not guard against a second call; doing
    /// so replaces the uuid and breaks every client holding the old one.
    pub fn build_identifier(&mut self) -> &str {
        self.uuid.insert(Uuid::new_v4().to_string())
    }

    pub fn assign_handle(&mut self, handle: impl Into<String>) {
        self.handle = Some(handle.into());
    }

    /// Returns false if the create time was already set.
    pub fn set_create_time(&mut self, millis: i64) -> bool {
        if self.create_time.is_some() {
            return false;
        }
        self.create_time = Some(millis);
        true
    }

    /// Returns false if the start time was already set.
    pub fn set_start_time(&mut self, millis: i64) -> bool {
        if self.start_time.is_some() {
            return false;
        }
        self.start_time = Some(millis);
        true
    }

    /// Move the instance forward in its lifecycle. Staying in the current
    /// state is allowed; going backwards is not.
    pub fn advance_state(&mut self, state: RoleState) -> Result<()> {
        if state < self.state {
            return Err(CoreError::StateRegression {
                uuid: self.uuid.clone().unwrap_or_default(),
                from: self.state,
                to: state,
            });
        }
        self.state = state;
        Ok(())
    }

    /// Mark the instance as targeted for termination. Returns false if it
    /// already was, so callers can avoid releasing it twice.
    pub fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        true
    }

    pub fn set_exit_code(&mut self, exit_code: i32) {
        self.exit_code = exit_code;
    }

    pub fn set_command(&mut self, command: Option<String>) {
        self.command = command;
    }

    pub fn set_diagnostics(&mut self, diagnostics: Option<String>) {
        self.diagnostics = diagnostics;
    }

    pub fn set_output(&mut self, output: Option<Vec<String>>) {
        self.output = output;
    }

    pub fn set_environment(&mut self, environment: Option<Vec<String>>) {
        self.environment = environment;
    }

    pub fn handle(&self) -> Option<&str> {
        self.handle.as_deref()
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    pub fn create_time(&self) -> Option<i64> {
        self.create_time
    }

    pub fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn role_id(&self) -> i32 {
        self.role_id
    }

    pub fn state(&self) -> RoleState {
        self.state
    }

    /// The exit code, once the instance has reached a terminal state.
    pub fn exit_code(&self) -> Option<i32> {
        self.state.is_terminal().then_some(self.exit_code)
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn diagnostics(&self) -> Option<&str> {
        self.diagnostics.as_deref()
    }

    pub fn output(&self) -> Option<&[String]> {
        self.output.as_deref()
    }

    pub fn environment(&self) -> Option<&[String]> {
        self.environment.as_deref()
    }

    /// Project this instance onto its wire form. The scheduling handle only
    /// contributes the identifying label.
    pub fn to_wire_format(&self) -> ClusterNode {
        ClusterNode {
            name: self
                .handle
                .clone()
                .unwrap_or_else(|| UNALLOCATED_INSTANCE.to_string()),
            command: self.command.clone(),
            diagnostics: self.diagnostics.clone(),
            role: self.role.clone(),
            uuid: self.uuid.clone(),
            environment: self.environment.clone().unwrap_or_default(),
            output: self.output.clone().unwrap_or_default(),
            role_id: self.role_id,
            state: self.state,
            exit_code: self.exit_code,
        }
    }
}

impl fmt::Display for RoleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RoleInstance{{handle={}, uuid={}, role={}, role_id={}, state={}, released={}, \
             create_time={:?}, start_time={:?}, exit_code={}}}",
            self.handle.as_deref().unwrap_or(UNALLOCATED_INSTANCE),
            self.uuid.as_deref().unwrap_or("-"),
            self.role.as_deref().unwrap_or("-"),
            self.role_id,
            self.state,
            self.released,
            self.create_time,
            self.start_time,
            self.exit_code,
        )
    }
}

/// Wire projection of a role instance, as seen by clients.
///
/// `None` means the controller did not know the value. It is never the same
/// thing as an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNode {
    pub name: String,
    pub command: Option<String>,
    pub diagnostics: Option<String>,
    pub role: Option<String>,
    pub uuid: Option<String>,
    pub environment: Vec<String>,
    pub output: Vec<String>,
    pub role_id: i32,
    pub state: RoleState,
    pub exit_code: i32,
}

impl ClusterNode {
    pub fn exit_code(&self) -> Option<i32> {
        self.state.is_terminal().then_some(self.exit_code)
    }
}

impl fmt::Display for ClusterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ClusterNode{{name={}, uuid={}, role={}, role_id={}, state={}",
            self.name,
            self.uuid.as_deref().unwrap_or("-"),
            self.role.as_deref().unwrap_or("-"),
            self.role_id,
            self.state,
        )?;
        if let Some(exit_code) = self.exit_code() {
            write!(f, ", exit_code={exit_code}")?;
        }
        if let Some(command) = &self.command {
            write!(f, ", command='{command}'")?;
        }
        if let Some(diagnostics) = &self.diagnostics {
            write!(f, ", diagnostics='{diagnostics}'")?;
        }
        if !self.output.is_empty() {
            write!(f, ", output={:?}", self.output)?;
        }
        f.write_str("}")
    }
}
