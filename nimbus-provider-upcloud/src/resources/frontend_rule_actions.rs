//! Matcher and action blocks of load balancer frontend rules
//!
//! Each kind of matcher or action is its own list inside a single `matchers`
//! or `actions` block. The load balancer evaluates actions in the order they
//! are sent, so `set_forwarded_headers` always goes first.

use std::collections::HashMap;

use nimbus_core::resource::Value;
use nimbus_core::schema::{AttributeSchema, AttributeType, BlockSchema, Validator};

use super::{get_blocks, get_bool, get_int, get_string};
use crate::client::{
    ACTION_HTTP_REDIRECT, ACTION_HTTP_RETURN, ACTION_SET_FORWARDED_HEADERS, ACTION_TCP_REJECT,
    ACTION_USE_BACKEND, ActionHttpRedirect, ActionHttpReturn, LoadBalancerAction,
    LoadBalancerMatcher, MATCHER_HOST, MATCHER_HTTP_METHOD, MATCHER_PATH, MATCHER_SRC_IP,
    MATCHER_SRC_PORT, MatchInteger, MatchString,
};

const MAX_ITEMS: usize = 100;

const INTEGER_METHODS: [&str; 6] = [
    "equal",
    "greater",
    "greater_or_equal",
    "less",
    "less_or_equal",
    "range",
];
const STRING_METHODS: [&str; 5] = ["exact", "substring", "regexp", "starts", "ends"];
const HTTP_METHODS: [&str; 9] = [
    "CONNECT", "DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PUT", "TRACE",
];

fn enum_of(values: &[&str]) -> AttributeType {
    AttributeType::Enum(values.iter().map(|v| v.to_string()).collect())
}

fn list_of(name: &str, block: BlockSchema, description: &str) -> AttributeSchema {
    AttributeSchema::new(name, AttributeType::Block(block.max_items(MAX_ITEMS)))
        .optional()
        .force_new()
        .with_description(description)
}

fn field(name: &str, attr_type: AttributeType) -> AttributeSchema {
    AttributeSchema::new(name, attr_type).required().force_new()
}

fn inverse() -> AttributeSchema {
    AttributeSchema::new("inverse", AttributeType::Bool)
        .with_default(Value::Bool(false))
        .force_new()
        .with_description("Negate the match")
}

fn active() -> AttributeSchema {
    AttributeSchema::new("active", AttributeType::Bool)
        .with_default(Value::Bool(true))
        .force_new()
}

// =============================================================================
// Matchers
// =============================================================================

pub fn matchers_block() -> BlockSchema {
    let string_matcher = |value: AttributeSchema| {
        BlockSchema::new().attribute(value).attribute(inverse())
    };

    BlockSchema::new()
        .attribute(list_of(
            MATCHER_SRC_IP,
            string_matcher(field("value", AttributeType::String)),
            "Matches by source IP address",
        ))
        .attribute(list_of(
            MATCHER_SRC_PORT,
            BlockSchema::new()
                .attribute(field("method", enum_of(&INTEGER_METHODS)))
                .attribute(field("value", AttributeType::Int))
                .attribute(inverse()),
            "Matches by source port number",
        ))
        .attribute(list_of(
            MATCHER_HOST,
            string_matcher(field("value", AttributeType::String)),
            "Matches by the Host header",
        ))
        .attribute(list_of(
            MATCHER_HTTP_METHOD,
            string_matcher(field("value", enum_of(&HTTP_METHODS))),
            "Matches by HTTP method",
        ))
        .attribute(list_of(
            MATCHER_PATH,
            BlockSchema::new()
                .attribute(field("method", enum_of(&STRING_METHODS)))
                .attribute(field("value", AttributeType::String))
                .attribute(
                    AttributeSchema::new("ignore_case", AttributeType::Bool)
                        .with_default(Value::Bool(false))
                        .force_new(),
                )
                .attribute(inverse()),
            "Matches by URL path",
        ))
        .max_items(1)
}

fn string_match(item: &HashMap<String, Value>) -> MatchString {
    MatchString {
        method: get_string(item, "method"),
        value: get_string(item, "value").unwrap_or_default(),
        ignore_case: get_bool(item, "ignore_case"),
    }
}

fn matcher(matcher_type: &str, item: &HashMap<String, Value>) -> LoadBalancerMatcher {
    let mut m = LoadBalancerMatcher {
        matcher_type: matcher_type.to_string(),
        inverse: get_bool(item, "inverse"),
        ..Default::default()
    };
    match matcher_type {
        MATCHER_SRC_IP => m.match_src_ip = Some(string_match(item)),
        MATCHER_SRC_PORT => {
            m.match_src_port = Some(MatchInteger {
                method: get_string(item, "method").unwrap_or_default(),
                value: get_int(item, "value").unwrap_or_default(),
            })
        }
        MATCHER_HOST => m.match_host = Some(string_match(item)),
        MATCHER_HTTP_METHOD => m.match_http_method = Some(string_match(item)),
        _ => m.match_path = Some(string_match(item)),
    }
    m
}

/// Matchers of the `matchers` block, grouped by type
pub fn matchers_from_attributes(attrs: &HashMap<String, Value>) -> Vec<LoadBalancerMatcher> {
    let Some(block) = attrs.get("matchers").and_then(Value::first_block) else {
        return Vec::new();
    };

    [
        MATCHER_SRC_IP,
        MATCHER_SRC_PORT,
        MATCHER_HOST,
        MATCHER_HTTP_METHOD,
        MATCHER_PATH,
    ]
    .into_iter()
    .flat_map(|t| {
        get_blocks(block, t)
            .into_iter()
            .map(move |item| matcher(t, item))
    })
    .collect()
}

fn string_match_value(m: &MatchString, inverse: bool) -> HashMap<String, Value> {
    let mut item = HashMap::from([
        ("value".to_string(), Value::String(m.value.clone())),
        ("inverse".to_string(), Value::Bool(inverse)),
    ]);
    if let Some(method) = &m.method {
        item.insert("method".to_string(), Value::String(method.clone()));
    }
    if let Some(ignore_case) = m.ignore_case {
        item.insert("ignore_case".to_string(), Value::Bool(ignore_case));
    }
    item
}

/// The `matchers` block of a rule read from the API
pub fn matchers_to_value(matchers: &[LoadBalancerMatcher]) -> Result<Option<Value>, String> {
    if matchers.is_empty() {
        return Ok(None);
    }

    let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
    for m in matchers {
        let inverse = m.inverse.unwrap_or(false);
        let item = match m.matcher_type.as_str() {
            MATCHER_SRC_IP => m.match_src_ip.as_ref().map(|s| string_match_value(s, inverse)),
            MATCHER_HOST => m.match_host.as_ref().map(|s| string_match_value(s, inverse)),
            MATCHER_HTTP_METHOD => m
                .match_http_method
                .as_ref()
                .map(|s| string_match_value(s, inverse)),
            MATCHER_PATH => m.match_path.as_ref().map(|s| {
                let mut item = string_match_value(s, inverse);
                item.entry("ignore_case".to_string())
                    .or_insert(Value::Bool(false));
                item
            }),
            MATCHER_SRC_PORT => m.match_src_port.as_ref().map(|p| {
                HashMap::from([
                    ("method".to_string(), Value::String(p.method.clone())),
                    ("value".to_string(), Value::Int(p.value)),
                    ("inverse".to_string(), Value::Bool(inverse)),
                ])
            }),
            other => return Err(format!("received unsupported matcher type '{}'", other)),
        };
        let item = item.ok_or_else(|| format!("matcher '{}' has no parameters", m.matcher_type))?;
        grouped
            .entry(m.matcher_type.clone())
            .or_default()
            .push(Value::Map(item));
    }

    Ok(Some(grouped_block(grouped)))
}

// =============================================================================
// Actions
// =============================================================================

pub fn actions_block() -> BlockSchema {
    BlockSchema::new()
        .attribute(list_of(
            ACTION_USE_BACKEND,
            BlockSchema::new().attribute(field("backend_name", AttributeType::String)),
            "Routes traffic to the named backend",
        ))
        .attribute(list_of(
            ACTION_HTTP_REDIRECT,
            BlockSchema::new()
                .attribute(
                    AttributeSchema::new("location", AttributeType::String)
                        .optional()
                        .force_new()
                        .with_validator(Validator::StringNotEmpty),
                )
                .attribute(
                    AttributeSchema::new("scheme", enum_of(&["http", "https"]))
                        .optional()
                        .force_new(),
                ),
            "Redirects to a location or URL scheme, one at a time",
        ))
        .attribute(list_of(
            ACTION_HTTP_RETURN,
            BlockSchema::new()
                .attribute(field("content_type", AttributeType::String))
                .attribute(
                    field("status", AttributeType::Int)
                        .with_validator(Validator::IntBetween(100, 599)),
                )
                .attribute(
                    field("payload", AttributeType::String)
                        .with_validator(Validator::StringLenBetween(1, 4096)),
                ),
            "Returns a fixed HTTP response",
        ))
        .attribute(list_of(
            ACTION_TCP_REJECT,
            BlockSchema::new().attribute(active()),
            "Terminates the connection",
        ))
        .attribute(list_of(
            ACTION_SET_FORWARDED_HEADERS,
            BlockSchema::new().attribute(active()),
            "Adds X-Forwarded-For / -Proto / -Port headers",
        ))
        .min_items(1)
        .max_items(1)
}

/// Actions of the `actions` block in the order the load balancer runs them
pub fn actions_from_attributes(
    attrs: &HashMap<String, Value>,
) -> Result<Vec<LoadBalancerAction>, String> {
    let Some(block) = attrs.get("actions").and_then(Value::first_block) else {
        return Ok(Vec::new());
    };

    let mut actions: Vec<LoadBalancerAction> = get_blocks(block, ACTION_SET_FORWARDED_HEADERS)
        .iter()
        .map(|_| LoadBalancerAction::set_forwarded_headers())
        .collect();

    actions.extend(
        get_blocks(block, ACTION_USE_BACKEND)
            .into_iter()
            .map(|item| LoadBalancerAction::use_backend(get_string(item, "backend_name").unwrap_or_default())),
    );

    actions.extend(get_blocks(block, ACTION_HTTP_RETURN).into_iter().map(|item| {
        LoadBalancerAction::http_return(ActionHttpReturn {
            status: get_int(item, "status").unwrap_or_default(),
            content_type: get_string(item, "content_type").unwrap_or_default(),
            payload: get_string(item, "payload").unwrap_or_default(),
        })
    }));

    for item in get_blocks(block, ACTION_HTTP_REDIRECT) {
        let redirect = match (get_string(item, "location"), get_string(item, "scheme")) {
            (Some(_), Some(_)) => return Err(REDIRECT_BOTH.to_string()),
            (None, None) => return Err(REDIRECT_NEITHER.to_string()),
            (location, scheme) => ActionHttpRedirect { location, scheme },
        };
        actions.push(LoadBalancerAction::http_redirect(redirect));
    }

    actions.extend(
        get_blocks(block, ACTION_TCP_REJECT)
            .iter()
            .map(|_| LoadBalancerAction::tcp_reject()),
    );

    Ok(actions)
}

/// The `actions` block of a rule read from the API
pub fn actions_to_value(actions: &[LoadBalancerAction]) -> Result<Option<Value>, String> {
    if actions.is_empty() {
        return Ok(None);
    }

    let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
    for a in actions {
        let item = match a.action_type.as_str() {
            ACTION_USE_BACKEND => a.action_use_backend.as_ref().map(|u| {
                HashMap::from([("backend_name".to_string(), Value::String(u.backend.clone()))])
            }),
            ACTION_HTTP_REDIRECT => a.action_http_redirect.as_ref().map(|r| {
                let mut item = HashMap::new();
                if let Some(location) = &r.location {
                    item.insert("location".to_string(), Value::String(location.clone()));
                }
                if let Some(scheme) = &r.scheme {
                    item.insert("scheme".to_string(), Value::String(scheme.clone()));
                }
                item
            }),
            ACTION_HTTP_RETURN => a.action_http_return.as_ref().map(|r| {
                HashMap::from([
                    ("content_type".to_string(), Value::String(r.content_type.clone())),
                    ("status".to_string(), Value::Int(r.status)),
                    ("payload".to_string(), Value::String(r.payload.clone())),
                ])
            }),
            ACTION_TCP_REJECT | ACTION_SET_FORWARDED_HEADERS => {
                Some(HashMap::from([("active".to_string(), Value::Bool(true))]))
            }
            other => return Err(format!("received unsupported action type '{}'", other)),
        };
        let item = item.ok_or_else(|| format!("action '{}' has no parameters", a.action_type))?;
        grouped
            .entry(a.action_type.clone())
            .or_default()
            .push(Value::Map(item));
    }

    Ok(Some(grouped_block(grouped)))
}

fn grouped_block(grouped: HashMap<String, Vec<Value>>) -> Value {
    Value::block(
        grouped
            .into_iter()
            .map(|(k, items)| (k, Value::List(items)))
            .collect(),
    )
}

// =============================================================================
// Plan-time rules
// =============================================================================

const NO_ACTIONS: &str = "actions block should contain at least one action";
const REDIRECT_NEITHER: &str = "either location or scheme should be defined for http_redirect";
const REDIRECT_BOTH: &str =
    "only either location or scheme should be defined at a time for http_redirect";

pub fn validate_actions_not_empty(attrs: &HashMap<String, Value>) -> Result<(), String> {
    let Some(block) = attrs.get("actions").and_then(Value::first_block) else {
        return Ok(());
    };
    // set_forwarded_headers alone never terminates a request
    let any = block
        .iter()
        .filter(|(action_type, _)| action_type.as_str() != ACTION_SET_FORWARDED_HEADERS)
        .any(|(_, v)| v.as_list().is_some_and(|items| !items.is_empty()));
    if any { Ok(()) } else { Err(NO_ACTIONS.to_string()) }
}

pub fn validate_http_redirects(attrs: &HashMap<String, Value>) -> Result<(), String> {
    let Some(block) = attrs.get("actions").and_then(Value::first_block) else {
        return Ok(());
    };
    for item in get_blocks(block, ACTION_HTTP_REDIRECT) {
        match (get_string(item, "location"), get_string(item, "scheme")) {
            (Some(_), Some(_)) => return Err(REDIRECT_BOTH.to_string()),
            (None, None) => return Err(REDIRECT_NEITHER.to_string()),
            _ => {}
        }
    }
    Ok(())
}
