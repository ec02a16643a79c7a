//! UpCloud provider implementation
//!
//! Routes each operation to the handler of its resource type. Handlers are
//! stateless; the provider only owns the API client and the configuration.

use std::sync::Arc;

use nimbus_core::provider::{ProviderError, ProviderResult};
use nimbus_core::resource::{Resource, ResourceId, State};

use crate::client::{HttpClient, UpcloudApi};
use crate::config::ProviderConfig;
use crate::resources::{database_user, frontend_rule, network};

/// UpCloud Provider
pub struct UpcloudProvider<C: UpcloudApi + ?Sized = HttpClient> {
    client: Arc<C>,
    config: ProviderConfig,
}

fn unsupported(id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("Unsupported resource type: {}", id.resource_type))
        .for_resource(id.clone())
}

impl UpcloudProvider<HttpClient> {
    /// Create a provider talking to the API with the given credentials
    pub fn from_config(config: ProviderConfig) -> ProviderResult<Self> {
        config.validate().map_err(|e| {
            ProviderError::new(format!("Invalid provider configuration: {}", e)).with_cause(e)
        })?;
        let client = HttpClient::new(&config).map_err(|e| {
            ProviderError::new(format!("Failed to build API client: {}", e)).with_cause(e)
        })?;
        Ok(Self::with_client(Arc::new(client), config))
    }
}

impl<C: UpcloudApi + ?Sized> UpcloudProvider<C> {
    pub fn with_client(client: Arc<C>, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    pub async fn read_resource(&self, id: &ResourceId, identifier: Option<&str>) -> ProviderResult<State> {
        let Some(identifier) = identifier else {
            return Ok(State::not_found(id.clone()));
        };
        let client = self.client.as_ref();

        match id.resource_type.as_str() {
            network::RESOURCE_TYPE => network::read(client, id, identifier).await,
            database_user::RESOURCE_TYPE => database_user::read(client, id, identifier).await,
            frontend_rule::RESOURCE_TYPE => frontend_rule::read(client, id, identifier).await,
            _ => Err(unsupported(id)),
        }
    }

    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let client = self.client.as_ref();

        match resource.id.resource_type.as_str() {
            network::RESOURCE_TYPE => network::create(client, resource).await,
            database_user::RESOURCE_TYPE => {
                database_user::create(client, &self.config, resource).await
            }
            frontend_rule::RESOURCE_TYPE => frontend_rule::create(client, resource).await,
            _ => Err(unsupported(&resource.id)),
        }
    }

    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        let client = self.client.as_ref();

        match id.resource_type.as_str() {
            network::RESOURCE_TYPE => network::update(client, id, identifier, from, to).await,
            database_user::RESOURCE_TYPE => {
                database_user::update(client, &self.config, id, identifier, from, to).await
            }
            frontend_rule::RESOURCE_TYPE => {
                frontend_rule::update(client, id, identifier, from, to).await
            }
            _ => Err(unsupported(id)),
        }
    }

    pub async fn delete_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
    ) -> ProviderResult<()> {
        let client = self.client.as_ref();

        match id.resource_type.as_str() {
            network::RESOURCE_TYPE => network::delete(client, id, identifier).await,
            database_user::RESOURCE_TYPE => {
                database_user::delete(client, &self.config, id, identifier, from).await
            }
            frontend_rule::RESOURCE_TYPE => frontend_rule::delete(client, id, identifier).await,
            _ => Err(unsupported(id)),
        }
    }

    pub async fn import_resource(&self, id: &ResourceId, import_id: &str) -> ProviderResult<State> {
        let client = self.client.as_ref();

        let state = match id.resource_type.as_str() {
            database_user::RESOURCE_TYPE => database_user::import(client, id, import_id).await?,
            _ => self.read_resource(id, Some(import_id)).await?,
        };
        if !state.exists {
            return Err(ProviderError::new(format!(
                "Cannot import non-existent remote object \"{}\"",
                import_id
            ))
            .for_resource(id.clone()));
        }
        Ok(state)
    }

    pub fn validate_replace_resource(&self, from: &State, to: &Resource) -> ProviderResult<()> {
        match to.id.resource_type.as_str() {
            database_user::RESOURCE_TYPE => database_user::validate_replace(from, to),
            _ => Ok(()),
        }
    }
}
