//! `network` - SDN private network with a single IP network

use std::collections::HashMap;

use log::info;
use nimbus_core::differ::has_change;
use nimbus_core::provider::{ProviderError, ProviderResult};
use nimbus_core::resource::{Resource, ResourceId, State, Value};
use nimbus_core::schema::{AttributeSchema, AttributeType, BlockSchema, ResourceSchema, Validator, types};

use super::{get_blocks, get_bool, get_string, get_string_list, require_string};
use crate::client::{CreateNetworkRequest, IpNetwork, IpNetworks, ModifyNetworkRequest, Network, UpcloudApi};
use crate::utils::{api_error, handle_read_error};

pub const RESOURCE_TYPE: &str = "network";

pub fn schema() -> ResourceSchema {
    let ip_network = BlockSchema::new()
        .attribute(
            AttributeSchema::new("address", types::cidr())
                .required()
                .force_new()
                .with_description("Network address in CIDR notation"),
        )
        .attribute(
            AttributeSchema::new("dhcp", AttributeType::Bool)
                .required()
                .with_description("Whether DHCP is enabled"),
        )
        .attribute(
            AttributeSchema::new("dhcp_default_route", AttributeType::Bool)
                .optional()
                .computed()
                .with_description("Whether the gateway is advertised as the default route"),
        )
        .attribute(
            AttributeSchema::new("dhcp_dns", AttributeType::Set(Box::new(types::ip_address())))
                .optional()
                .computed()
                .with_description("DNS servers handed out by DHCP"),
        )
        .attribute(
            AttributeSchema::new("dhcp_routes", AttributeType::Set(Box::new(types::cidr())))
                .optional()
                .computed()
                .with_description("Additional routes handed out by DHCP"),
        )
        .attribute(
            AttributeSchema::new(
                "family",
                AttributeType::Enum(vec!["IPv4".to_string(), "IPv6".to_string()]),
            )
            .required(),
        )
        .attribute(
            AttributeSchema::new("gateway", AttributeType::String)
                .optional()
                .computed(),
        )
        .min_items(1)
        .max_items(1);

    ResourceSchema::new(RESOURCE_TYPE)
        .with_description("Private SDN network")
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .with_validator(Validator::StringNotEmpty),
        )
        .attribute(
            AttributeSchema::new("zone", AttributeType::String)
                .required()
                .force_new()
                .with_description("Zone the network lives in, e.g. fi-hel1"),
        )
        .attribute(
            AttributeSchema::new("router", AttributeType::String)
                .optional()
                .with_description("UUID of an attached router"),
        )
        .attribute(AttributeSchema::new("type", AttributeType::String).computed())
        .attribute(
            AttributeSchema::new("ip_network", AttributeType::Block(ip_network)).required(),
        )
}

// =============================================================================
// Attribute Mapping
// =============================================================================

fn ip_network_from_block(block: &HashMap<String, Value>) -> IpNetwork {
    IpNetwork {
        address: get_string(block, "address").unwrap_or_default(),
        dhcp: get_bool(block, "dhcp").unwrap_or(false),
        dhcp_default_route: get_bool(block, "dhcp_default_route").unwrap_or(false),
        dhcp_dns: get_string_list(block, "dhcp_dns"),
        dhcp_routes: get_string_list(block, "dhcp_routes"),
        family: get_string(block, "family").unwrap_or_default(),
        gateway: get_string(block, "gateway").unwrap_or_default(),
    }
}

fn ip_networks_from_attributes(attrs: &HashMap<String, Value>) -> IpNetworks {
    IpNetworks {
        ip_network: get_blocks(attrs, "ip_network")
            .into_iter()
            .map(ip_network_from_block)
            .collect(),
    }
}

pub fn build_create_request(id: &ResourceId, resource: &Resource) -> ProviderResult<CreateNetworkRequest> {
    Ok(CreateNetworkRequest {
        name: require_string(id, &resource.attributes, "name")?,
        zone: require_string(id, &resource.attributes, "zone")?,
        router: get_string(&resource.attributes, "router"),
        ip_networks: ip_networks_from_attributes(&resource.attributes),
    })
}

fn ip_network_to_block(ipn: &IpNetwork) -> Value {
    let mut block = HashMap::from([
        ("address".to_string(), Value::String(ipn.address.clone())),
        ("dhcp".to_string(), Value::Bool(ipn.dhcp)),
        (
            "dhcp_default_route".to_string(),
            Value::Bool(ipn.dhcp_default_route),
        ),
        (
            "dhcp_dns".to_string(),
            Value::string_list(ipn.dhcp_dns.iter().cloned()),
        ),
        (
            "dhcp_routes".to_string(),
            Value::string_list(ipn.dhcp_routes.iter().cloned()),
        ),
        ("family".to_string(), Value::String(ipn.family.clone())),
    ]);
    if !ipn.gateway.is_empty() {
        block.insert("gateway".to_string(), Value::String(ipn.gateway.clone()));
    }
    Value::Map(block)
}

pub fn attributes_from_network(network: &Network) -> Result<HashMap<String, Value>, String> {
    if network.ip_networks.ip_network.len() > 1 {
        return Err(format!(
            "too many ip_networks: {}",
            network.ip_networks.ip_network.len()
        ));
    }

    let mut attrs = HashMap::from([
        ("name".to_string(), Value::String(network.name.clone())),
        ("zone".to_string(), Value::String(network.zone.clone())),
        ("type".to_string(), Value::String(network.network_type.clone())),
        (
            "ip_network".to_string(),
            Value::List(
                network
                    .ip_networks
                    .ip_network
                    .iter()
                    .map(ip_network_to_block)
                    .collect(),
            ),
        ),
    ]);
    if let Some(router) = network.router.as_ref().filter(|r| !r.is_empty()) {
        attrs.insert("router".to_string(), Value::String(router.clone()));
    }
    Ok(attrs)
}

// =============================================================================
// Resource Operations
// =============================================================================

pub async fn create<C: UpcloudApi + ?Sized>(client: &C, resource: &Resource) -> ProviderResult<State> {
    let id = &resource.id;
    let request = build_create_request(id, resource)?;

    let network = client
        .create_network(&request)
        .await
        .map_err(|e| api_error(id, "Failed to create network", e))?;
    info!("created network {} ({})", network.name, network.uuid);

    read(client, id, &network.uuid).await
}

pub async fn read<C: UpcloudApi + ?Sized>(
    client: &C,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<State> {
    let network = match client.get_network_details(identifier).await {
        Ok(network) => network,
        Err(e) => return handle_read_error(id, identifier, e),
    };

    let attrs = attributes_from_network(&network)
        .map_err(|message| ProviderError::new(message).for_resource(id.clone()))?;

    Ok(State::existing(id.clone(), attrs).with_identifier(identifier))
}

pub async fn update<C: UpcloudApi + ?Sized>(
    client: &C,
    id: &ResourceId,
    identifier: &str,
    from: &State,
    to: &Resource,
) -> ProviderResult<State> {
    let schema = schema();

    let mut request = ModifyNetworkRequest::default();
    if has_change(&schema, from, to, "name") {
        request.name = Some(require_string(id, &to.attributes, "name")?);
    }
    if has_change(&schema, from, to, "ip_network") {
        request.ip_networks = Some(ip_networks_from_attributes(&to.attributes));
    }
    if !request.is_empty() {
        client
            .modify_network(identifier, &request)
            .await
            .map_err(|e| api_error(id, "Failed to modify network", e))?;
    }

    if has_change(&schema, from, to, "router") {
        match get_string(&to.attributes, "router") {
            Some(router) => client
                .attach_network_router(identifier, &router)
                .await
                .map_err(|e| api_error(id, "Failed to attach router", e))?,
            None => client
                .detach_network_router(identifier)
                .await
                .map_err(|e| api_error(id, "Failed to detach router", e))?,
        }
    }

    read(client, id, identifier).await
}

pub async fn delete<C: UpcloudApi + ?Sized>(
    client: &C,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<()> {
    client
        .delete_network(identifier)
        .await
        .map_err(|e| api_error(id, "Failed to delete network", e))?;
    info!("deleted network {}", identifier);
    Ok(())
}
