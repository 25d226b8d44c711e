//! Cluster descriptions
//!
//! A `ClusterDescription` is a whole-cluster snapshot exchanged as JSON. It
//! doubles as the desired-state document submitted on resize: the
//! `instances` option of each role names how many instances it should have.

use crate::RoleState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Role option holding the desired instance count.
pub const ROLE_INSTANCES: &str = "instances";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("Failed to parse cluster description: {0}")]
    Parse(String),
    #[error("Failed to serialize cluster description: {0}")]
    Serialize(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDescription {
    pub name: String,
    #[serde(default)]
    pub state: RoleState,
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub update_time: i64,
    /// Per-role options, keyed by role name.
    #[serde(default)]
    pub roles: BTreeMap<String, BTreeMap<String, String>>,
    /// Uuids of live directory entries, keyed by role name.
    #[serde(default)]
    pub instances: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub status: BTreeMap<String, String>,
}

impl ClusterDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    /// Desired instance count for a role. Missing or unparseable values
    /// count as zero.
    pub fn desired_instances(&self, role: &str) -> u32 {
        self.roles
            .get(role)
            .and_then(|options| options.get(ROLE_INSTANCES))
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn set_desired_instances(&mut self, role: &str, count: u32) {
        self.roles
            .entry(role.to_string())
            .or_default()
            .insert(ROLE_INSTANCES.to_string(), count.to_string());
    }

    pub fn actual_instances(&self, role: &str) -> usize {
        self.instances.get(role).map_or(0, Vec::len)
    }
}

/// Converts cluster descriptions to and from their textual form.
pub trait DescriptorCodec: Send + Sync {
    fn parse(&self, text: &str) -> Result<ClusterDescription, DescriptorError>;
    fn serialize(&self, description: &ClusterDescription) -> Result<String, DescriptorError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDescriptorCodec;

impl DescriptorCodec for JsonDescriptorCodec {
    fn parse(&self, text: &str) -> Result<ClusterDescription, DescriptorError> {
        serde_json::from_str(text).map_err(|e| DescriptorError::Parse(e.to_string()))
    }

    fn serialize(&self, description: &ClusterDescription) -> Result<String, DescriptorError> {
        serde_json::to_string_pretty(description)
            .map_err(|e| DescriptorError::Serialize(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_description() -> ClusterDescription {
        let mut description = ClusterDescription::new("test-cluster");
        description.state = RoleState::Live;
        description.create_time = 1_700_000_000_000;
        description.set_desired_instances("master", 1);
        description.set_desired_instances("worker", 3);
        description
            .instances
            .insert("worker".to_string(), vec!["u1".to_string(), "u2".to_string()]);
        description
    }

    #[test]
    fn test_desired_instances() {
        let description = sample_description();
        assert_eq!(description.desired_instances("worker"), 3);
        assert_eq!(description.desired_instances("master"), 1);
        assert_eq!(description.desired_instances("unknown"), 0);
        assert_eq!(description.actual_instances("worker"), 2);
        assert_eq!(
            description.role_names().collect::<Vec<_>>(),
            vec!["master", "worker"]
        );
    }

    #[test]
    fn test_desired_instances_ignores_garbage() {
        let mut description = ClusterDescription::new("c");
        description
            .roles
            .entry("worker".to_string())
            .or_default()
            .insert(ROLE_INSTANCES.to_string(), "many".to_string());
        assert_eq!(description.desired_instances("worker"), 0);
    }

    #[test]
    fn test_json_codec_round_trip() {
        let codec = JsonDescriptorCodec;
        let description = sample_description();

        let text = codec.serialize(&description).unwrap();
        let parsed = codec.parse(&text).unwrap();
        assert_eq!(parsed, description);
    }

    #[test]
    fn test_json_codec_minimal_document() {
        let parsed = JsonDescriptorCodec.parse(r#"{"name":"c1"}"#).unwrap();
        assert_eq!(parsed.name, "c1");
        assert_eq!(parsed.state, RoleState::Uninitialized);
        assert!(parsed.roles.is_empty());
    }

    #[test]
    fn test_json_codec_rejects_truncated_document() {
        let text = JsonDescriptorCodec.serialize(&sample_description()).unwrap();
        let truncated = &text[..text.len() / 2];

        let err = JsonDescriptorCodec.parse(truncated).unwrap_err();
        assert!(matches!(err, DescriptorError::Parse(_)));
    }
}
