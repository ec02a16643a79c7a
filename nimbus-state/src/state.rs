//! State file structures for persisting managed resources

use std::collections::HashMap;

use nimbus_core::resource::{ResourceId, State, Value, attributes_from_json};
use serde::{Deserialize, Serialize};

/// The main state file structure that persists to the backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file format version
    pub version: u32,
    /// Monotonically increasing number for each state modification
    pub serial: u64,
    /// Unique identifier for this state lineage
    pub lineage: String,
    /// Version of Nimbus that last modified this state
    pub nimbus_version: String,
    pub resources: Vec<ResourceState>,
}

impl StateFile {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            lineage: uuid::Uuid::new_v4().to_string(),
            nimbus_version: env!("CARGO_PKG_VERSION").to_string(),
            resources: Vec::new(),
        }
    }

    /// Increment serial and stamp the current version before a write
    pub fn increment_serial(&mut self) {
        self.serial += 1;
        self.nimbus_version = env!("CARGO_PKG_VERSION").to_string();
    }

    pub fn find_resource(&self, id: &ResourceId) -> Option<&ResourceState> {
        self.resources
            .iter()
            .find(|r| r.resource_type == id.resource_type && r.name == id.name)
    }

    /// Add or replace a resource, keeping its position
    pub fn upsert_resource(&mut self, resource: ResourceState) {
        match self
            .resources
            .iter_mut()
            .find(|r| r.resource_type == resource.resource_type && r.name == resource.name)
        {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
    }

    pub fn remove_resource(&mut self, id: &ResourceId) -> Option<ResourceState> {
        let pos = self
            .resources
            .iter()
            .position(|r| r.resource_type == id.resource_type && r.name == id.name)?;
        Some(self.resources.remove(pos))
    }

    /// Remote identifiers by resource, as handed to `Provider::read`
    pub fn identifiers(&self) -> HashMap<ResourceId, String> {
        self.resources
            .iter()
            .filter_map(|r| r.identifier.clone().map(|i| (r.id(), i)))
            .collect()
    }
}

impl Default for StateFile {
    fn default() -> Self {
        Self::new()
    }
}

/// State of a single managed resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Resource type (e.g., "network", "managed_database_user")
    pub resource_type: String,
    pub name: String,
    /// Provider name (e.g., "upcloud")
    pub provider: String,
    /// Remote identifier (e.g., `<serviceUUID>/<username>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// All attributes of the resource as JSON values
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl ResourceState {
    pub fn new(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            provider: provider.into(),
            identifier: None,
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Record a state read from a provider
    pub fn from_state(state: &State, provider: impl Into<String>) -> Self {
        Self {
            resource_type: state.id.resource_type.clone(),
            name: state.id.name.clone(),
            provider: provider.into(),
            identifier: state.identifier.clone(),
            attributes: state
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        }
    }

    pub fn id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }

    /// Stored attributes as a provider state
    pub fn to_state(&self) -> State {
        let attributes: HashMap<String, Value> = attributes_from_json(
            &self
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        let state = State::existing(self.id(), attributes);
        match &self.identifier {
            Some(identifier) => state.with_identifier(identifier),
            None => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(t: &str, name: &str) -> ResourceId {
        ResourceId::new(t, name)
    }

    #[test]
    fn test_state_file_new() {
        let state = StateFile::new();
        assert_eq!(state.version, StateFile::CURRENT_VERSION);
        assert_eq!(state.serial, 0);
        assert!(!state.lineage.is_empty());
        assert!(state.resources.is_empty());
    }

    #[test]
    fn test_increment_serial() {
        let mut state = StateFile::new();
        state.increment_serial();
        state.increment_serial();
        assert_eq!(state.serial, 2);
    }

    #[test]
    fn test_upsert_keeps_position() {
        let mut state = StateFile::new();
        state.upsert_resource(ResourceState::new("network", "lan", "upcloud"));
        state.upsert_resource(ResourceState::new("network", "wan", "upcloud"));
        state.upsert_resource(
            ResourceState::new("network", "lan", "upcloud").with_attribute("name", json!("renamed")),
        );

        assert_eq!(state.resources.len(), 2);
        assert_eq!(state.resources[0].name, "lan");
        assert_eq!(state.resources[0].attributes["name"], json!("renamed"));
    }

    #[test]
    fn test_remove_resource() {
        let mut state = StateFile::new();
        state.upsert_resource(ResourceState::new("network", "lan", "upcloud"));

        assert!(state.remove_resource(&id("network", "lan")).is_some());
        assert!(state.remove_resource(&id("network", "lan")).is_none());
        assert!(state.resources.is_empty());
    }

    #[test]
    fn test_state_conversion_keeps_identifier_and_nested_blocks() {
        let block = HashMap::from([("address".to_string(), Value::String("10.0.0.0/24".to_string()))]);
        let state = State::existing(
            id("network", "lan"),
            HashMap::from([
                ("name".to_string(), Value::String("lan".to_string())),
                ("ip_network".to_string(), Value::block(block)),
            ]),
        )
        .with_identifier("03000001");

        let stored = ResourceState::from_state(&state, "upcloud");
        assert_eq!(stored.identifier.as_deref(), Some("03000001"));
        assert_eq!(
            stored.attributes["ip_network"],
            json!([{"address": "10.0.0.0/24"}])
        );
        assert_eq!(stored.to_state(), state);
    }

    #[test]
    fn test_identifiers_skip_resources_without_one() {
        let mut state = StateFile::new();
        let mut lan = ResourceState::new("network", "lan", "upcloud");
        lan.identifier = Some("03000001".to_string());
        state.upsert_resource(lan);
        state.upsert_resource(ResourceState::new("network", "pending", "upcloud"));

        let ids = state.identifiers();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[&id("network", "lan")], "03000001");
    }

    #[test]
    fn test_state_file_serialization() {
        let mut state = StateFile::new();
        state.upsert_resource(
            ResourceState::new("managed_database_user", "app", "upcloud")
                .with_attribute("username", json!("app")),
        );

        let json = serde_json::to_string_pretty(&state).unwrap();
        assert!(json.contains("\"nimbus_version\""));
        assert!(!json.contains("\"identifier\""));

        let deserialized: StateFile = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.lineage, state.lineage);
        assert_eq!(deserialized.resources, state.resources);
    }
}
