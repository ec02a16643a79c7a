//! Resource types handled by the UpCloud provider
//!
//! Each submodule declares a schema and the create / read / update / delete
//! handlers that translate attributes into API requests and back.

pub mod access_control;
pub mod database_user;
pub mod frontend_rule;
pub mod frontend_rule_actions;
pub mod network;

use std::collections::HashMap;

use nimbus_core::provider::{ProviderError, ProviderResult, ResourceType};
use nimbus_core::resource::{ResourceId, Value};
use nimbus_core::schema::ResourceSchema;

// =============================================================================
// Resource Type Definitions
// =============================================================================

macro_rules! define_resource_type {
    ($name:ident, $module:ident) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $module::RESOURCE_TYPE
            }
            fn schema(&self) -> ResourceSchema {
                $module::schema()
            }
        }
    };
}

define_resource_type!(NetworkType, network);
define_resource_type!(ManagedDatabaseUserType, database_user);
define_resource_type!(LoadBalancerFrontendRuleType, frontend_rule);

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(NetworkType),
        Box::new(ManagedDatabaseUserType),
        Box::new(LoadBalancerFrontendRuleType),
    ]
}

// =============================================================================
// Attribute Helpers
// =============================================================================

pub(crate) fn get_string(attrs: &HashMap<String, Value>, key: &str) -> Option<String> {
    attrs
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn get_bool(attrs: &HashMap<String, Value>, key: &str) -> Option<bool> {
    attrs.get(key).and_then(Value::as_bool)
}

pub(crate) fn get_int(attrs: &HashMap<String, Value>, key: &str) -> Option<i64> {
    attrs.get(key).and_then(Value::as_int)
}

pub(crate) fn get_string_list(attrs: &HashMap<String, Value>, key: &str) -> Vec<String> {
    attrs
        .get(key)
        .and_then(Value::as_list)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Items of a block attribute; absent blocks have no items
pub(crate) fn get_blocks<'a>(
    attrs: &'a HashMap<String, Value>,
    key: &str,
) -> Vec<&'a HashMap<String, Value>> {
    attrs
        .get(key)
        .and_then(Value::as_list)
        .map(|items| items.iter().filter_map(Value::as_map).collect())
        .unwrap_or_default()
}

pub(crate) fn require_string(
    id: &ResourceId,
    attrs: &HashMap<String, Value>,
    key: &str,
) -> ProviderResult<String> {
    get_string(attrs, key).ok_or_else(|| {
        ProviderError::new(format!("Required attribute '{}' is missing", key))
            .for_resource(id.clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_type_has_a_matching_schema() {
        for t in resource_types() {
            assert_eq!(t.schema().resource_type, t.name());
        }
    }

    #[test]
    fn empty_strings_read_as_unset() {
        let attrs = HashMap::from([("router".to_string(), Value::String(String::new()))]);
        assert_eq!(get_string(&attrs, "router"), None);
        assert!(require_string(&ResourceId::new("network", "lan"), &attrs, "router").is_err());
    }
}
