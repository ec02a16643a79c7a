//! `managed_database_user` - user of a managed database service
//!
//! Identifier: `<serviceUUID>/<username>`. Users can only be changed while
//! the service is powered on and running.

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, info};
use nimbus_core::differ::has_change;
use nimbus_core::provider::{ProviderError, ProviderResult};
use nimbus_core::resource::{Resource, ResourceId, State, Value};
use nimbus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator};

use super::access_control::{self, BLOCKS};
use super::{get_string, require_string};
use crate::client::{
    CreateManagedDatabaseUserRequest, MANAGED_DATABASE_STATE_RUNNING,
    MANAGED_DATABASE_USER_TYPE_PRIMARY, ManagedDatabase, ManagedDatabaseServiceType,
    ManagedDatabaseUser, ModifyManagedDatabaseUserRequest, UpcloudApi,
};
use crate::config::ProviderConfig;
use crate::utils::{
    api_error, build_sub_resource_id, handle_read_error, id_error,
    split_managed_database_sub_resource_id,
};
use crate::wait::wait_for_managed_database_state;

pub const RESOURCE_TYPE: &str = "managed_database_user";

pub const DEFAULT_AUTHENTICATION: &str = "caching_sha2_password";

const INVALID_IMPORT_ID: &str = "invalid import id. Format: <managedDatabaseUUID>/<username>";

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .with_description("User of a managed database service")
        .attribute(
            AttributeSchema::new("service", AttributeType::String)
                .required()
                .force_new()
                .with_validator(Validator::StringNotEmpty)
                .with_description("UUID of the managed database service"),
        )
        .attribute(
            AttributeSchema::new("username", AttributeType::String)
                .required()
                .force_new()
                .with_validator(Validator::StringLenBetween(1, 64)),
        )
        .attribute(
            AttributeSchema::new("password", AttributeType::String)
                .optional()
                .computed()
                .sensitive()
                .with_validator(Validator::StringLenBetween(8, 256))
                .with_description("Generated by the service when omitted"),
        )
        .attribute(
            AttributeSchema::new("type", AttributeType::String)
                .computed()
                .with_description("primary or normal"),
        )
        .attribute(
            AttributeSchema::new(
                "authentication",
                AttributeType::Enum(vec![
                    DEFAULT_AUTHENTICATION.to_string(),
                    "mysql_native_password".to_string(),
                ]),
            )
            .optional()
            .computed()
            .with_description("MySQL only. Defaults to caching_sha2_password"),
        )
        .attribute(access_control::pg_schema())
        .attribute(access_control::redis_schema())
        .attribute(access_control::opensearch_schema())
}

/// Attributes of a user as seen through the API
pub fn attributes_from_user(service: &str, user: &ManagedDatabaseUser) -> HashMap<String, Value> {
    let mut attrs = HashMap::from([
        ("service".to_string(), Value::String(service.to_string())),
        ("username".to_string(), Value::String(user.username.clone())),
        ("type".to_string(), Value::String(user.user_type.clone())),
    ]);
    if !user.password.is_empty() {
        attrs.insert("password".to_string(), Value::String(user.password.clone()));
    }
    if !user.authentication.is_empty() {
        attrs.insert(
            "authentication".to_string(),
            Value::String(user.authentication.clone()),
        );
    }
    access_control::to_attributes(user, &mut attrs);
    attrs
}

fn precondition(id: &ResourceId, message: String) -> ProviderError {
    ProviderError::new(message).for_resource(id.clone())
}

/// Fetch the service, require it powered on, then wait until it accepts changes
async fn ready_service<C: UpcloudApi + ?Sized>(
    client: &C,
    config: &ProviderConfig,
    id: &ResourceId,
    service: &str,
    action: &str,
    timeout: Duration,
) -> ProviderResult<ManagedDatabase> {
    let details = client
        .get_managed_database(service)
        .await
        .map_err(|e| api_error(id, "Failed to get managed database", e))?;

    if !details.powered {
        return Err(precondition(
            id,
            format!(
                "cannot {} a user while managed database {} ({}) is powered off",
                action, details.name, service
            ),
        ));
    }

    wait_for_managed_database_state(
        client,
        service,
        timeout,
        config.poll_interval,
        &[MANAGED_DATABASE_STATE_RUNNING],
    )
    .await
    .map_err(|e| {
        ProviderError::new(format!("Managed database {} is not ready: {}", service, e))
            .for_resource(id.clone())
            .with_cause(e)
    })
}

// =============================================================================
// Resource Operations
// =============================================================================

pub async fn create<C: UpcloudApi + ?Sized>(
    client: &C,
    config: &ProviderConfig,
    resource: &Resource,
) -> ProviderResult<State> {
    let id = &resource.id;
    let attrs = &resource.attributes;
    let service = require_string(id, attrs, "service")?;
    let username = require_string(id, attrs, "username")?;
    let access_control =
        access_control::from_attributes(attrs).map_err(|message| precondition(id, message))?;

    let details = ready_service(client, config, id, &service, "create", config.create_timeout).await?;

    if let Some(ac) = &access_control {
        access_control::check_service_type(ac, details.service_type)
            .map_err(|message| precondition(id, message))?;
    }

    let authentication = (details.service_type == ManagedDatabaseServiceType::Mysql).then(|| {
        get_string(attrs, "authentication").unwrap_or_else(|| DEFAULT_AUTHENTICATION.to_string())
    });

    let request = CreateManagedDatabaseUserRequest {
        username: username.clone(),
        password: get_string(attrs, "password"),
        authentication,
        access_control,
    };

    client
        .create_managed_database_user(&service, &request)
        .await
        .map_err(|e| api_error(id, "Failed to create managed database user", e))?;
    info!(
        "created user {} in managed database {} ({})",
        username, details.name, service
    );

    read(client, id, &build_sub_resource_id(&[&service, &username])).await
}

pub async fn read<C: UpcloudApi + ?Sized>(
    client: &C,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<State> {
    let (service, username) =
        split_managed_database_sub_resource_id(identifier).map_err(|e| id_error(id, e))?;

    if let Err(e) = client.get_managed_database(&service).await {
        return handle_read_error(id, identifier, e);
    }

    let user = match client.get_managed_database_user(&service, &username).await {
        Ok(user) => user,
        Err(e) => return handle_read_error(id, identifier, e),
    };

    Ok(State::existing(id.clone(), attributes_from_user(&service, &user)).with_identifier(identifier))
}

pub async fn update<C: UpcloudApi + ?Sized>(
    client: &C,
    config: &ProviderConfig,
    id: &ResourceId,
    identifier: &str,
    from: &State,
    to: &Resource,
) -> ProviderResult<State> {
    let schema = schema();
    let (service, username) =
        split_managed_database_sub_resource_id(identifier).map_err(|e| id_error(id, e))?;

    let access_control_changed = BLOCKS.iter().any(|b| has_change(&schema, from, to, b));
    let access_control = if access_control_changed {
        access_control::from_attributes(&to.attributes)
            .map_err(|message| precondition(id, message))?
    } else {
        None
    };

    let details = ready_service(client, config, id, &service, "modify", config.update_timeout).await?;

    if let Some(ac) = &access_control {
        access_control::check_service_type(ac, details.service_type)
            .map_err(|message| precondition(id, message))?;
    }

    let mut request = ModifyManagedDatabaseUserRequest::default();
    if has_change(&schema, from, to, "password") {
        request.password = get_string(&to.attributes, "password");
    }
    if details.service_type == ManagedDatabaseServiceType::Mysql
        && has_change(&schema, from, to, "authentication")
    {
        request.authentication = get_string(&to.attributes, "authentication");
    }
    if !request.is_empty() {
        client
            .modify_managed_database_user(&service, &username, &request)
            .await
            .map_err(|e| api_error(id, "Failed to modify managed database user", e))?;
    }

    if let Some(ac) = &access_control {
        client
            .modify_managed_database_user_access_control(&service, &username, ac)
            .await
            .map_err(|e| api_error(id, "Failed to modify access control", e))?;
    }

    read(client, id, identifier).await
}

pub async fn delete<C: UpcloudApi + ?Sized>(
    client: &C,
    config: &ProviderConfig,
    id: &ResourceId,
    identifier: &str,
    from: &State,
) -> ProviderResult<()> {
    if from.get_str("type") == Some(MANAGED_DATABASE_USER_TYPE_PRIMARY) {
        debug!("{} is the primary user and is never deleted", identifier);
        return Ok(());
    }

    let (service, username) =
        split_managed_database_sub_resource_id(identifier).map_err(|e| id_error(id, e))?;

    ready_service(client, config, id, &service, "delete", config.delete_timeout).await?;

    client
        .delete_managed_database_user(&service, &username)
        .await
        .map_err(|e| api_error(id, "Failed to delete managed database user", e))?;
    info!("deleted user {} from managed database {}", username, service);
    Ok(())
}

/// The primary user can never be renamed
pub fn validate_replace(from: &State, to: &Resource) -> ProviderResult<()> {
    if from.get_str("type") != Some(MANAGED_DATABASE_USER_TYPE_PRIMARY) {
        return Ok(());
    }
    if from.get_str("username") != to.get_str("username") {
        let identifier = from.identifier.as_deref().unwrap_or_default();
        return Err(precondition(
            &to.id,
            format!("primary username cannot be changed {:?}", identifier),
        ));
    }
    Ok(())
}

pub async fn import<C: UpcloudApi + ?Sized>(
    client: &C,
    id: &ResourceId,
    import_id: &str,
) -> ProviderResult<State> {
    if split_managed_database_sub_resource_id(import_id).is_err() {
        return Err(ProviderError::new(INVALID_IMPORT_ID).for_resource(id.clone()));
    }
    read(client, id, import_id).await
}
