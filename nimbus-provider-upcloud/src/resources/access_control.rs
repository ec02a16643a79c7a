//! Access-control blocks of database users
//!
//! At most one of the three blocks may be populated, and it must match the
//! type of the database service. The populated block selects the variant
//! sent to the API.

use std::collections::HashMap;

use nimbus_core::resource::Value;
use nimbus_core::schema::{AttributeSchema, AttributeType, BlockSchema};

use super::{get_blocks, get_bool, get_string, get_string_list};
use crate::client::{
    ManagedDatabaseServiceType, ManagedDatabaseUser, ManagedDatabaseUserAccessControl,
    OpenSearchAccessControl, OpenSearchAccessControlRule, PgAccessControl, RedisAccessControl,
};

pub const PG_ACCESS_CONTROL: &str = "pg_access_control";
pub const REDIS_ACCESS_CONTROL: &str = "redis_access_control";
pub const OPENSEARCH_ACCESS_CONTROL: &str = "opensearch_access_control";

pub const BLOCKS: [&str; 3] = [PG_ACCESS_CONTROL, REDIS_ACCESS_CONTROL, OPENSEARCH_ACCESS_CONTROL];

const OPENSEARCH_PERMISSIONS: [&str; 5] = ["admin", "deny", "read", "readwrite", "write"];

fn others(name: &str) -> Vec<&'static str> {
    BLOCKS.iter().copied().filter(|b| *b != name).collect()
}

fn string_list(name: &str, description: &str) -> AttributeSchema {
    AttributeSchema::new(name, AttributeType::List(Box::new(AttributeType::String)))
        .optional()
        .computed()
        .with_description(description)
}

pub fn pg_schema() -> AttributeSchema {
    let block = BlockSchema::new()
        .attribute(
            AttributeSchema::new("allow_replication", AttributeType::Bool)
                .with_default(Value::Bool(true))
                .with_description("Grant replication privilege"),
        )
        .max_items(1);

    AttributeSchema::new(PG_ACCESS_CONTROL, AttributeType::Block(block))
        .optional()
        .computed()
        .conflicts_with(&others(PG_ACCESS_CONTROL))
        .with_description("PostgreSQL access control")
}

pub fn redis_schema() -> AttributeSchema {
    let block = BlockSchema::new()
        .attribute(string_list("categories", "Allowed command categories"))
        .attribute(string_list("channels", "Allowed pub/sub channel patterns"))
        .attribute(string_list("commands", "Allowed commands"))
        .attribute(string_list("keys", "Allowed key patterns"))
        .max_items(1);

    AttributeSchema::new(REDIS_ACCESS_CONTROL, AttributeType::Block(block))
        .optional()
        .computed()
        .conflicts_with(&others(REDIS_ACCESS_CONTROL))
        .with_description("Redis access control")
}

pub fn opensearch_schema() -> AttributeSchema {
    let rule = BlockSchema::new()
        .attribute(
            AttributeSchema::new("index", AttributeType::String)
                .required()
                .with_description("Index name pattern"),
        )
        .attribute(
            AttributeSchema::new(
                "permission",
                AttributeType::Enum(OPENSEARCH_PERMISSIONS.iter().map(|p| p.to_string()).collect()),
            )
            .required(),
        );
    let block = BlockSchema::new()
        .attribute(AttributeSchema::new("rules", AttributeType::Block(rule)).required())
        .max_items(1);

    AttributeSchema::new(OPENSEARCH_ACCESS_CONTROL, AttributeType::Block(block))
        .optional()
        .computed()
        .conflicts_with(&others(OPENSEARCH_ACCESS_CONTROL))
        .with_description("OpenSearch access control")
}

/// Build the access-control payload from the populated block, if any
pub fn from_attributes(
    attrs: &HashMap<String, Value>,
) -> Result<Option<ManagedDatabaseUserAccessControl>, String> {
    let populated: Vec<(&str, &HashMap<String, Value>)> = BLOCKS
        .iter()
        .filter_map(|name| get_blocks(attrs, name).first().map(|b| (*name, *b)))
        .collect();

    match populated.as_slice() {
        [] => Ok(None),
        [(name, block)] => Ok(Some(variant_from_block(name, block))),
        _ => Err(format!(
            "only one of {} can be set",
            populated
                .iter()
                .map(|(name, _)| *name)
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}

fn variant_from_block(name: &str, block: &HashMap<String, Value>) -> ManagedDatabaseUserAccessControl {
    match name {
        PG_ACCESS_CONTROL => ManagedDatabaseUserAccessControl::Pg(PgAccessControl {
            allow_replication: Some(get_bool(block, "allow_replication").unwrap_or(true)),
        }),
        REDIS_ACCESS_CONTROL => ManagedDatabaseUserAccessControl::Redis(RedisAccessControl {
            categories: get_string_list(block, "categories"),
            channels: get_string_list(block, "channels"),
            commands: get_string_list(block, "commands"),
            keys: get_string_list(block, "keys"),
        }),
        _ => ManagedDatabaseUserAccessControl::OpenSearch(OpenSearchAccessControl {
            rules: get_blocks(block, "rules")
                .into_iter()
                .map(|rule| OpenSearchAccessControlRule {
                    index: get_string(rule, "index").unwrap_or_default(),
                    permission: get_string(rule, "permission").unwrap_or_default(),
                })
                .collect(),
        }),
    }
}

/// Name of the block holding this variant
pub fn block_name(access_control: &ManagedDatabaseUserAccessControl) -> &'static str {
    match access_control {
        ManagedDatabaseUserAccessControl::Pg(_) => PG_ACCESS_CONTROL,
        ManagedDatabaseUserAccessControl::Redis(_) => REDIS_ACCESS_CONTROL,
        ManagedDatabaseUserAccessControl::OpenSearch(_) => OPENSEARCH_ACCESS_CONTROL,
    }
}

/// The variant must belong to the service it is sent to
pub fn check_service_type(
    access_control: &ManagedDatabaseUserAccessControl,
    service_type: ManagedDatabaseServiceType,
) -> Result<(), String> {
    let matches = matches!(
        (access_control, service_type),
        (ManagedDatabaseUserAccessControl::Pg(_), ManagedDatabaseServiceType::Pg)
            | (ManagedDatabaseUserAccessControl::Redis(_), ManagedDatabaseServiceType::Redis)
            | (
                ManagedDatabaseUserAccessControl::OpenSearch(_),
                ManagedDatabaseServiceType::OpenSearch
            )
    );
    if matches {
        Ok(())
    } else {
        Err(format!(
            "{} cannot be used with a {} managed database",
            block_name(access_control),
            service_type
        ))
    }
}

/// Copy the access control returned by the API into state attributes
pub fn to_attributes(user: &ManagedDatabaseUser, attrs: &mut HashMap<String, Value>) {
    if let Some(pg) = &user.pg_access_control {
        attrs.insert(
            PG_ACCESS_CONTROL.to_string(),
            Value::block(HashMap::from([(
                "allow_replication".to_string(),
                Value::Bool(pg.allow_replication.unwrap_or(true)),
            )])),
        );
    }

    if let Some(redis) = &user.redis_access_control {
        attrs.insert(
            REDIS_ACCESS_CONTROL.to_string(),
            Value::block(HashMap::from([
                ("categories".to_string(), Value::string_list(redis.categories.iter().cloned())),
                ("channels".to_string(), Value::string_list(redis.channels.iter().cloned())),
                ("commands".to_string(), Value::string_list(redis.commands.iter().cloned())),
                ("keys".to_string(), Value::string_list(redis.keys.iter().cloned())),
            ])),
        );
    }

    if let Some(opensearch) = &user.opensearch_access_control {
        let rules = opensearch
            .rules
            .iter()
            .map(|rule| {
                Value::Map(HashMap::from([
                    ("index".to_string(), Value::String(rule.index.clone())),
                    ("permission".to_string(), Value::String(rule.permission.clone())),
                ]))
            })
            .collect();
        attrs.insert(
            OPENSEARCH_ACCESS_CONTROL.to_string(),
            Value::block(HashMap::from([("rules".to_string(), Value::List(rules))])),
        );
    }
}
