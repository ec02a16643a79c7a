//! Configuration file loading
//!
//! ```json
//! {
//!   "provider": { "username": "...", "password": "..." },
//!   "backend": { "type": "local", "path": "nimbus.state.json" },
//!   "resources": [
//!     { "type": "network", "name": "lan", "attributes": { ... } }
//!   ]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use nimbus_core::provider::{Provider, ResourceType};
use nimbus_core::resource::{Resource, Value, attributes_from_json};
use nimbus_core::schema::ResourceSchema;
use nimbus_provider_upcloud::{ProviderConfig, UpcloudProvider};
use nimbus_state::BackendConfig;
use serde::Deserialize;

use crate::error::CliError;

type JsonObject = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    provider: JsonObject,
    #[serde(default)]
    backend: Option<RawBackend>,
    #[serde(default)]
    resources: Vec<RawResource>,
}

#[derive(Debug, Deserialize)]
struct RawBackend {
    #[serde(rename = "type", default = "default_backend_type")]
    backend_type: String,
    #[serde(flatten)]
    attributes: JsonObject,
}

fn default_backend_type() -> String {
    "local".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResource {
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    attributes: JsonObject,
}

/// A parsed configuration file
#[derive(Debug)]
pub struct Configuration {
    /// Attributes of the `provider` block
    pub provider: HashMap<String, Value>,
    pub backend: BackendConfig,
    /// Declared resources in file order
    pub resources: Vec<Resource>,
}

impl Configuration {
    pub fn parse(content: &str, path: &str) -> Result<Self, CliError> {
        let raw: RawConfig = serde_json::from_str(content).map_err(|source| CliError::ParseFile {
            path: path.to_string(),
            source,
        })?;

        let backend = match raw.backend {
            Some(b) => BackendConfig {
                backend_type: b.backend_type,
                attributes: attributes_from_json(&b.attributes),
            },
            None => BackendConfig::default(),
        };

        let mut seen = HashSet::new();
        let mut resources = Vec::with_capacity(raw.resources.len());
        for r in raw.resources {
            let mut resource = Resource::new(r.resource_type, r.name);
            resource.attributes = attributes_from_json(&r.attributes);
            if !seen.insert(resource.id.clone()) {
                return Err(CliError::DuplicateResource(resource.id.to_string()));
            }
            resources.push(resource);
        }

        Ok(Self {
            provider: attributes_from_json(&raw.provider),
            backend,
            resources,
        })
    }

    pub fn load(path: &Path) -> Result<Self, CliError> {
        let display = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|source| CliError::ReadFile {
            path: display.clone(),
            source,
        })?;
        Self::parse(&content, &display)
    }

    /// Build the provider named by the `provider` block
    ///
    /// Credentials from the environment are overridden by the block.
    pub fn provider(&self) -> Result<Box<dyn Provider>, CliError> {
        if let Some(name) = self.provider.get("name").and_then(Value::as_str)
            && name != "upcloud"
        {
            return Err(CliError::UnknownProvider(name.to_string()));
        }

        let mut config = ProviderConfig::from_env();
        config.merge_attributes(&self.provider)?;
        Ok(Box::new(UpcloudProvider::from_config(config)?))
    }
}

/// Schemas keyed by resource type name
pub fn schemas(types: Vec<Box<dyn ResourceType>>) -> HashMap<String, ResourceSchema> {
    types
        .into_iter()
        .map(|t| (t.name().to_string(), t.schema()))
        .collect()
}

/// Apply schema defaults and validate every resource
///
/// All errors are collected as "{type}.{name}: {error}".
pub fn validate_resources(
    resources: &[Resource],
    schemas: &HashMap<String, ResourceSchema>,
) -> Result<Vec<Resource>, CliError> {
    let mut errors = Vec::new();
    let mut validated = Vec::with_capacity(resources.len());

    for resource in resources {
        let Some(schema) = schemas.get(&resource.id.resource_type) else {
            errors.push(format!(
                "{}: unknown resource type '{}'",
                resource.id, resource.id.resource_type
            ));
            continue;
        };

        let mut resource = resource.clone();
        schema.apply_defaults(&mut resource.attributes);
        if let Err(type_errors) = schema.validate(&resource.attributes) {
            errors.extend(type_errors.iter().map(|e| format!("{}: {}", resource.id, e)));
        }
        validated.push(resource);
    }

    if errors.is_empty() {
        Ok(validated)
    } else {
        Err(CliError::Validation(errors))
    }
}
