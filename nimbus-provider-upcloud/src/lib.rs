//! Nimbus UpCloud Provider
//!
//! Manages UpCloud networks, managed database users and load balancer
//! frontend rules.
//!
//! ## Module Structure
//!
//! - `client` - API client trait, HTTP implementation and wire types
//! - `config` - Credentials, endpoint and timeouts
//! - `provider` - UpcloudProvider implementation
//! - `resources` - Resource schemas and CRUD handlers
//! - `utils` - Sub-resource identifiers and error mapping
//! - `wait` - Managed database readiness polling

pub mod client;
pub mod config;
pub mod provider;
pub mod resources;
pub mod utils;
pub mod wait;

// Re-export main types
pub use client::{ApiError, HttpClient, UpcloudApi};
pub use config::{ConfigError, ProviderConfig};
pub use provider::UpcloudProvider;

use nimbus_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use nimbus_core::resource::{Resource, ResourceId, State};

use resources::resource_types;

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl<C: UpcloudApi + ?Sized + 'static> Provider for UpcloudProvider<C> {
    fn name(&self) -> &'static str {
        "upcloud"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(|s| s.to_string());
        Box::pin(async move { self.read_resource(&id, identifier.as_deref()).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, &to).await })
    }

    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        Box::pin(async move { self.delete_resource(&id, &identifier, &from).await })
    }

    fn import(&self, id: &ResourceId, import_id: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let import_id = import_id.to_string();
        Box::pin(async move { self.import_resource(&id, &import_id).await })
    }

    fn validate_replace(&self, from: &State, to: &Resource) -> ProviderResult<()> {
        self.validate_replace_resource(from, to)
    }
}
