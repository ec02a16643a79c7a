//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the "desired state" declared in configuration with the "current state"
//! fetched from the Provider, and generates a list of required Effects (Plan).
//!
//! Only keys present in the desired value are compared, so values computed by
//! the API never show up as drift.

use std::collections::{HashMap, HashSet};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::{AttributeSchema, AttributeType, ResourceSchema};

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// A force-new attribute changed -> needs delete and create
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
    /// Resource exists but not in desired state -> needs deletion
    Delete(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let attributes = schema.map(|s| &s.attributes);
    let mut changed = find_changed_attributes(&desired.attributes, &current.attributes, attributes);
    changed.sort();

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let replace = schema.is_some_and(|s| {
        changed.iter().any(|key| {
            s.get(key).is_some_and(|attr| {
                requires_replace(attr, desired.attributes.get(key), current.attributes.get(key))
            })
        })
    });

    if replace {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Whether `key` differs between the current state and the desired resource
pub fn has_change(schema: &ResourceSchema, from: &State, to: &Resource, key: &str) -> bool {
    attribute_changed(
        to.attributes.get(key),
        from.attributes.get(key),
        schema.get(key),
    )
}

/// Find changed attributes between desired and current state
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    schemas: Option<&HashMap<String, AttributeSchema>>,
) -> Vec<String> {
    let mut keys: HashSet<&String> = desired.keys().collect();
    if let Some(schemas) = schemas {
        keys.extend(schemas.keys());
    }

    keys.into_iter()
        // Skip internal attributes (starting with _)
        .filter(|key| !key.starts_with('_'))
        .filter(|key| {
            attribute_changed(
                desired.get(*key),
                current.get(*key),
                schemas.and_then(|s| s.get(*key)),
            )
        })
        .cloned()
        .collect()
}

fn attribute_changed(
    desired: Option<&Value>,
    current: Option<&Value>,
    schema: Option<&AttributeSchema>,
) -> bool {
    match (desired, current) {
        (Some(d), Some(c)) => !value_matches(d, c, schema.map(|s| &s.attr_type)),
        (Some(_), None) => true,
        // Unsetting an optional attribute is a change; computed ones keep whatever the API set
        (None, Some(c)) => schema.is_some_and(|s| s.optional && !s.computed) && !is_empty(c),
        (None, None) => false,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::List(items) => items.is_empty(),
        Value::Map(map) => map.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn value_matches(desired: &Value, current: &Value, ty: Option<&AttributeType>) -> bool {
    match (desired, current) {
        (Value::Map(d), Value::Map(c)) => match ty {
            Some(AttributeType::Block(block)) => {
                find_changed_attributes(d, c, Some(&block.attributes)).is_empty()
            }
            _ => d.iter().all(|(k, dv)| {
                c.get(k)
                    .is_some_and(|cv| value_matches(dv, cv, field_type(ty)))
            }),
        },
        (Value::List(d), Value::List(c)) => {
            if d.len() != c.len() {
                return false;
            }
            match ty {
                Some(AttributeType::Set(inner)) => d
                    .iter()
                    .all(|dv| c.iter().any(|cv| value_matches(dv, cv, Some(inner)))),
                _ => d
                    .iter()
                    .zip(c)
                    .all(|(dv, cv)| value_matches(dv, cv, item_type(ty))),
            }
        }
        _ => desired == current,
    }
}

/// Type of the items of a list-like attribute; a block's items are typed by the block
fn item_type(ty: Option<&AttributeType>) -> Option<&AttributeType> {
    match ty? {
        AttributeType::List(inner) | AttributeType::Set(inner) => Some(inner),
        block @ AttributeType::Block(_) => Some(block),
        AttributeType::Custom { base, .. } => item_type(Some(base)),
        _ => None,
    }
}

fn field_type(ty: Option<&AttributeType>) -> Option<&AttributeType> {
    match ty? {
        AttributeType::Map(inner) => Some(inner),
        _ => None,
    }
}

fn requires_replace(attr: &AttributeSchema, desired: Option<&Value>, current: Option<&Value>) -> bool {
    if attr.force_new {
        return true;
    }
    let AttributeType::Block(block) = &attr.attr_type else {
        return false;
    };

    let items = |v: Option<&Value>| v.and_then(Value::as_list).map(<[Value]>::to_vec).unwrap_or_default();
    let (desired, current) = (items(desired), items(current));

    if desired.len() != current.len() {
        return block.attributes.values().any(contains_force_new);
    }

    desired.iter().zip(&current).any(|(d, c)| {
        let (Some(d), Some(c)) = (d.as_map(), c.as_map()) else {
            return false;
        };
        find_changed_attributes(d, c, Some(&block.attributes))
            .iter()
            .any(|key| {
                block
                    .attributes
                    .get(key)
                    .is_some_and(|nested| requires_replace(nested, d.get(key), c.get(key)))
            })
    })
}

fn contains_force_new(attr: &AttributeSchema) -> bool {
    attr.force_new
        || matches!(&attr.attr_type, AttributeType::Block(block) if block.attributes.values().any(contains_force_new))
}

/// Compute Diff for multiple resources and generate a Plan
///
/// Existing states with no desired counterpart are deleted, after every
/// other effect.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    schemas: &HashMap<String, ResourceSchema>,
) -> Plan {
    let mut plan = Plan::new();

    for resource in desired {
        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        let d = diff(resource, &current, schemas.get(&resource.id.resource_type));

        match d {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Update {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::Replace {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Replace {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::NoChange(_) => {}
            Diff::Delete(id) => {
                let from = current_states
                    .get(&id)
                    .cloned()
                    .unwrap_or_else(|| State::not_found(id.clone()));
                plan.add(Effect::Delete { id, from });
            }
        }
    }

    let declared: HashSet<&ResourceId> = desired.iter().map(|r| &r.id).collect();
    let mut orphans: Vec<&State> = current_states
        .values()
        .filter(|s| s.exists && !declared.contains(&s.id))
        .collect();
    orphans.sort_by_key(|s| s.id.to_string());

    for state in orphans {
        plan.add(Effect::Delete {
            id: state.id.clone(),
            from: state.clone(),
        });
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::BlockSchema;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    fn network_schema() -> ResourceSchema {
        let ip_network = BlockSchema::new()
            .attribute(
                AttributeSchema::new("address", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("dhcp", AttributeType::Bool).required())
            .attribute(
                AttributeSchema::new("gateway", AttributeType::String)
                    .optional()
                    .computed(),
            )
            .attribute(
                AttributeSchema::new("dhcp_dns", AttributeType::Set(Box::new(AttributeType::String)))
                    .optional(),
            )
            .min_items(1)
            .max_items(1);

        ResourceSchema::new("network")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(
                AttributeSchema::new("zone", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(AttributeSchema::new("router", AttributeType::String).optional())
            .attribute(AttributeSchema::new("type", AttributeType::String).computed())
            .attribute(AttributeSchema::new("ip_network", AttributeType::Block(ip_network)).required())
    }

    fn ip_network(address: &str, dhcp: bool) -> HashMap<String, Value> {
        HashMap::from([
            ("address".to_string(), s(address)),
            ("dhcp".to_string(), Value::Bool(dhcp)),
        ])
    }

    fn network(name: &str, zone: &str, block: HashMap<String, Value>) -> Resource {
        Resource::new("network", "lan")
            .with_attribute("name", s(name))
            .with_attribute("zone", s(zone))
            .with_attribute("ip_network", Value::block(block))
    }

    fn current(resource: &Resource) -> State {
        State::existing(resource.id.clone(), resource.attributes.clone()).with_identifier("03e4")
    }

    #[test]
    fn diff_create_when_not_exists() {
        let desired = Resource::new("network", "lan");
        let current = State::not_found(ResourceId::new("network", "lan"));

        let result = diff(&desired, &current, None);
        assert!(matches!(result, Diff::Create(_)));
    }

    #[test]
    fn computed_values_are_not_drift() {
        let schema = network_schema();
        let desired = network("lan", "fi-hel1", ip_network("10.0.0.0/24", true));

        let mut block = ip_network("10.0.0.0/24", true);
        block.insert("gateway".to_string(), s("10.0.0.1"));
        let mut state = current(&network("lan", "fi-hel1", block));
        state.attributes.insert("type".to_string(), s("private"));

        assert!(matches!(diff(&desired, &state, Some(&schema)), Diff::NoChange(_)));
    }

    #[test]
    fn diff_update_when_name_changes() {
        let schema = network_schema();
        let desired = network("renamed", "fi-hel1", ip_network("10.0.0.0/24", true));
        let state = current(&network("lan", "fi-hel1", ip_network("10.0.0.0/24", true)));

        match diff(&desired, &state, Some(&schema)) {
            Diff::Update {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, vec!["name".to_string()]),
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn nested_force_new_attribute_replaces() {
        let schema = network_schema();
        let desired = network("lan", "fi-hel1", ip_network("10.1.0.0/24", true));
        let state = current(&network("lan", "fi-hel1", ip_network("10.0.0.0/24", true)));

        assert!(matches!(diff(&desired, &state, Some(&schema)), Diff::Replace { .. }));
    }

    #[test]
    fn nested_plain_attribute_updates() {
        let schema = network_schema();
        let desired = network("lan", "fi-hel1", ip_network("10.0.0.0/24", false));
        let state = current(&network("lan", "fi-hel1", ip_network("10.0.0.0/24", true)));

        assert!(matches!(diff(&desired, &state, Some(&schema)), Diff::Update { .. }));
    }

    #[test]
    fn top_level_force_new_replaces() {
        let schema = network_schema();
        let desired = network("lan", "de-fra1", ip_network("10.0.0.0/24", true));
        let state = current(&network("lan", "fi-hel1", ip_network("10.0.0.0/24", true)));

        match diff(&desired, &state, Some(&schema)) {
            Diff::Replace {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, vec!["zone".to_string()]),
            other => panic!("Expected Replace, got {:?}", other),
        }
    }

    #[test]
    fn removing_optional_attribute_is_a_change() {
        let schema = network_schema();
        let desired = network("lan", "fi-hel1", ip_network("10.0.0.0/24", true));
        let mut state = current(&desired);
        state.attributes.insert("router".to_string(), s("04c0"));

        assert!(has_change(&schema, &state, &desired, "router"));
        assert!(!has_change(&schema, &state, &desired, "type"));
    }

    #[test]
    fn set_comparison_ignores_order() {
        let schema = network_schema();
        let mut desired_block = ip_network("10.0.0.0/24", true);
        desired_block.insert("dhcp_dns".to_string(), Value::string_list(["1.1.1.1", "8.8.8.8"]));
        let mut current_block = ip_network("10.0.0.0/24", true);
        current_block.insert("dhcp_dns".to_string(), Value::string_list(["8.8.8.8", "1.1.1.1"]));

        let desired = network("lan", "fi-hel1", desired_block);
        let state = current(&network("lan", "fi-hel1", current_block));

        assert!(matches!(diff(&desired, &state, Some(&schema)), Diff::NoChange(_)));
    }

    #[test]
    fn create_plan_deletes_orphans_last() {
        let schemas = HashMap::from([("network".to_string(), network_schema())]);
        let desired = vec![network("lan", "fi-hel1", ip_network("10.0.0.0/24", true))];

        let orphan_id = ResourceId::new("network", "old");
        let orphan = State::existing(orphan_id.clone(), HashMap::new()).with_identifier("03aa");
        let current_states = HashMap::from([(orphan_id.clone(), orphan)]);

        let plan = create_plan(&desired, &current_states, &schemas);

        assert_eq!(plan.effects().len(), 2);
        assert!(matches!(plan.effects()[0], Effect::Create(_)));
        assert!(matches!(&plan.effects()[1], Effect::Delete { id, .. } if *id == orphan_id));
    }
}
