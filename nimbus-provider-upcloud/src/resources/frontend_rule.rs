//! `loadbalancer_frontend_rule` - rule of a load balancer frontend
//!
//! Identifier: `<loadBalancerUUID>/<frontendName>/<ruleName>`.

use std::collections::HashMap;

use log::info;
use nimbus_core::differ::has_change;
use nimbus_core::provider::{ProviderError, ProviderResult};
use nimbus_core::resource::{Resource, ResourceId, State, Value};
use nimbus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, Validator};

use super::frontend_rule_actions::{
    actions_block, actions_from_attributes, actions_to_value, matchers_block,
    matchers_from_attributes, matchers_to_value, validate_actions_not_empty,
    validate_http_redirects,
};
use super::{get_int, require_string};
use crate::client::{LoadBalancerFrontendRule, ModifyLoadBalancerFrontendRuleRequest, UpcloudApi};
use crate::utils::{
    api_error, build_sub_resource_id, handle_read_error, id_error, split_frontend_id,
    split_frontend_rule_id,
};

pub const RESOURCE_TYPE: &str = "loadbalancer_frontend_rule";

pub fn schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .with_description("Rule of a load balancer frontend")
        .attribute(
            AttributeSchema::new("frontend", AttributeType::String)
                .required()
                .force_new()
                .with_validator(Validator::regex(
                    "^[^/]+/[^/]+$",
                    "expected <loadBalancerUUID>/<frontendName>",
                ))
                .with_description("ID of the frontend the rule belongs to"),
        )
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .with_validator(Validator::StringLenBetween(1, 64))
                .with_validator(Validator::regex(
                    "^[a-zA-Z0-9_-]+$",
                    "should contain only alphanumeric characters, underscores and dashes",
                )),
        )
        .attribute(
            AttributeSchema::new("priority", AttributeType::Int)
                .required()
                .with_validator(Validator::IntBetween(0, 100))
                .with_description("Rules with higher priority are evaluated first"),
        )
        .attribute(
            AttributeSchema::new("matchers", AttributeType::Block(matchers_block()))
                .optional()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("actions", AttributeType::Block(actions_block()))
                .required()
                .force_new(),
        )
        .rule(validate_actions_not_empty)
        .rule(validate_http_redirects)
}

fn invalid(id: &ResourceId, message: String) -> ProviderError {
    ProviderError::new(message).for_resource(id.clone())
}

pub fn build_rule(id: &ResourceId, attrs: &HashMap<String, Value>) -> ProviderResult<LoadBalancerFrontendRule> {
    Ok(LoadBalancerFrontendRule {
        name: require_string(id, attrs, "name")?,
        priority: get_int(attrs, "priority").unwrap_or_default(),
        matchers: matchers_from_attributes(attrs),
        actions: actions_from_attributes(attrs).map_err(|message| invalid(id, message))?,
    })
}

pub fn attributes_from_rule(
    frontend_id: &str,
    rule: &LoadBalancerFrontendRule,
) -> Result<HashMap<String, Value>, String> {
    let mut attrs = HashMap::from([
        ("frontend".to_string(), Value::String(frontend_id.to_string())),
        ("name".to_string(), Value::String(rule.name.clone())),
        ("priority".to_string(), Value::Int(rule.priority)),
    ]);
    if let Some(matchers) = matchers_to_value(&rule.matchers)? {
        attrs.insert("matchers".to_string(), matchers);
    }
    if let Some(actions) = actions_to_value(&rule.actions)? {
        attrs.insert("actions".to_string(), actions);
    }
    Ok(attrs)
}

// =============================================================================
// Resource Operations
// =============================================================================

pub async fn create<C: UpcloudApi + ?Sized>(client: &C, resource: &Resource) -> ProviderResult<State> {
    let id = &resource.id;
    let frontend = require_string(id, &resource.attributes, "frontend")?;
    let (lb, frontend_name) = split_frontend_id(&frontend).map_err(|e| id_error(id, e))?;
    let rule = build_rule(id, &resource.attributes)?;

    let created = client
        .create_load_balancer_frontend_rule(&lb, &frontend_name, &rule)
        .await
        .map_err(|e| api_error(id, "Failed to create frontend rule", e))?;
    info!(
        "created rule {} on load balancer {} frontend {}",
        created.name, lb, frontend_name
    );

    read(
        client,
        id,
        &build_sub_resource_id(&[&lb, &frontend_name, &created.name]),
    )
    .await
}

pub async fn read<C: UpcloudApi + ?Sized>(
    client: &C,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<State> {
    let (lb, frontend_name, name) = split_frontend_rule_id(identifier).map_err(|e| id_error(id, e))?;

    let rule = match client
        .get_load_balancer_frontend_rule(&lb, &frontend_name, &name)
        .await
    {
        Ok(rule) => rule,
        Err(e) => return handle_read_error(id, identifier, e),
    };

    let frontend_id = build_sub_resource_id(&[&lb, &frontend_name]);
    let attrs = attributes_from_rule(&frontend_id, &rule).map_err(|message| invalid(id, message))?;

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
    let (lb, frontend_name, name) = split_frontend_rule_id(identifier).map_err(|e| id_error(id, e))?;

    let mut request = ModifyLoadBalancerFrontendRuleRequest::default();
    if has_change(&schema, from, to, "name") {
        request.name = Some(require_string(id, &to.attributes, "name")?);
    }
    if has_change(&schema, from, to, "priority") {
        request.priority = get_int(&to.attributes, "priority");
    }
    if request == ModifyLoadBalancerFrontendRuleRequest::default() {
        return read(client, id, identifier).await;
    }

    let rule = client
        .modify_load_balancer_frontend_rule(&lb, &frontend_name, &name, &request)
        .await
        .map_err(|e| api_error(id, "Failed to modify frontend rule", e))?;
    info!(
        "modified rule {} on load balancer {} frontend {}",
        rule.name, lb, frontend_name
    );

    read(
        client,
        id,
        &build_sub_resource_id(&[&lb, &frontend_name, &rule.name]),
    )
    .await
}

pub async fn delete<C: UpcloudApi + ?Sized>(
    client: &C,
    id: &ResourceId,
    identifier: &str,
) -> ProviderResult<()> {
    let (lb, frontend_name, name) = split_frontend_rule_id(identifier).map_err(|e| id_error(id, e))?;

    client
        .delete_load_balancer_frontend_rule(&lb, &frontend_name, &name)
        .await
        .map_err(|e| api_error(id, "Failed to delete frontend rule", e))?;
    info!("deleted rule {} from {}/{}", name, lb, frontend_name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeApi;
    use crate::client::{
        ACTION_SET_FORWARDED_HEADERS, ACTION_USE_BACKEND, LoadBalancerAction, LoadBalancerMatcher,
        MATCHER_PATH, MatchString,
    };
    use nimbus_core::differ::{Diff, diff};

    const FRONTEND: &str = "0aded5c1-0000/web";

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    fn list(items: Vec<HashMap<String, Value>>) -> Value {
        Value::List(items.into_iter().map(Value::Map).collect())
    }

    fn desired(name: &str, priority: i64) -> Resource {
        let actions = HashMap::from([
            (
                ACTION_USE_BACKEND.to_string(),
                list(vec![HashMap::from([("backend_name".to_string(), s("api"))])]),
            ),
            (
                ACTION_SET_FORWARDED_HEADERS.to_string(),
                list(vec![HashMap::from([("active".to_string(), Value::Bool(true))])]),
            ),
        ]);
        let matchers = HashMap::from([(
            "host".to_string(),
            list(vec![HashMap::from([
                ("value".to_string(), s("api.example.com")),
                ("inverse".to_string(), Value::Bool(false)),
            ])]),
        )]);
        Resource::new(RESOURCE_TYPE, "api")
            .with_attribute("frontend", s(FRONTEND))
            .with_attribute("name", s(name))
            .with_attribute("priority", Value::Int(priority))
            .with_attribute("matchers", Value::block(matchers))
            .with_attribute("actions", Value::block(actions))
    }

    fn messages(resource: &Resource) -> Vec<String> {
        match schema().validate(&resource.attributes) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn schema_accepts_valid_rule() {
        assert!(messages(&desired("to-api", 10)).is_empty());
    }

    #[test]
    fn schema_checks_name_and_priority() {
        let errors = messages(&desired("bad name", 101));
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.starts_with("name:")));
        assert!(errors.iter().any(|e| e.starts_with("priority:")));
    }

    #[test]
    fn schema_requires_an_action() {
        let resource = desired("to-api", 10).with_attribute(
            "actions",
            Value::block(HashMap::from([(ACTION_USE_BACKEND.to_string(), Value::List(vec![]))])),
        );
        assert_eq!(
            messages(&resource),
            vec!["actions block should contain at least one action".to_string()]
        );
    }

    #[test]
    fn schema_rejects_forwarded_headers_only() {
        let resource = desired("to-api", 10).with_attribute(
            "actions",
            Value::block(HashMap::from([(
                ACTION_SET_FORWARDED_HEADERS.to_string(),
                list(vec![HashMap::from([("active".to_string(), Value::Bool(true))])]),
            )])),
        );
        assert_eq!(
            messages(&resource),
            vec!["actions block should contain at least one action".to_string()]
        );
    }

    #[tokio::test]
    async fn path_matcher_without_ignore_case_plans_no_change() {
        let schema = schema();
        let mut resource = desired("to-api", 10).with_attribute(
            "matchers",
            Value::block(HashMap::from([(
                MATCHER_PATH.to_string(),
                list(vec![HashMap::from([
                    ("method".to_string(), s("starts")),
                    ("value".to_string(), s("/api")),
                ])]),
            )])),
        );
        schema.apply_defaults(&mut resource.attributes);
        assert!(messages(&resource).is_empty());

        let api = FakeApi::new();
        let created = create(&api, &resource).await.unwrap();
        assert!(!diff(&resource, &created, Some(&schema)).is_change());

        // the API may leave ignore_case out of its response
        let rule = LoadBalancerFrontendRule {
            matchers: vec![LoadBalancerMatcher {
                matcher_type: MATCHER_PATH.to_string(),
                match_path: Some(MatchString {
                    method: Some("starts".to_string()),
                    value: "/api".to_string(),
                    ignore_case: None,
                }),
                ..Default::default()
            }],
            ..api.lock().rules.values().next().cloned().unwrap()
        };
        let api = FakeApi::new().with_rule("0aded5c1-0000", "web", rule);
        let current = read(&api, &resource.id, "0aded5c1-0000/web/to-api").await.unwrap();
        assert!(matches!(
            diff(&resource, &current, Some(&schema)),
            Diff::NoChange(_)
        ));
    }

    #[tokio::test]
    async fn create_sends_ordered_actions_and_reads_back() {
        let api = FakeApi::new();
        let state = create(&api, &desired("to-api", 10)).await.unwrap();

        assert_eq!(state.identifier.as_deref(), Some("0aded5c1-0000/web/to-api"));
        assert_eq!(state.get_str("frontend"), Some(FRONTEND));

        let stored = api.lock().rules.values().next().cloned().unwrap();
        assert_eq!(
            stored.actions,
            vec![
                LoadBalancerAction::set_forwarded_headers(),
                LoadBalancerAction::use_backend("api"),
            ]
        );
        assert_eq!(stored.matchers.len(), 1);
    }

    #[tokio::test]
    async fn create_with_bad_frontend_id_fails() {
        let api = FakeApi::new();
        let resource = desired("to-api", 10).with_attribute("frontend", s("no-separator"));

        assert!(create(&api, &resource).await.is_err());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn rename_changes_identifier() {
        let api = FakeApi::new();
        let created = create(&api, &desired("to-api", 10)).await.unwrap();
        let identifier = created.identifier.clone().unwrap();

        let to = desired("api-v2", 20);
        let state = update(&api, &to.id, &identifier, &created, &to).await.unwrap();

        assert_eq!(state.identifier.as_deref(), Some("0aded5c1-0000/web/api-v2"));
        assert_eq!(state.attributes.get("priority"), Some(&Value::Int(20)));
    }

    #[tokio::test]
    async fn read_rejects_unknown_action() {
        let rule = LoadBalancerFrontendRule {
            name: "odd".to_string(),
            priority: 1,
            matchers: vec![],
            actions: vec![LoadBalancerAction {
                action_type: "teleport".to_string(),
                ..Default::default()
            }],
        };
        let api = FakeApi::new().with_rule("0aded5c1-0000", "web", rule);

        let err = read(&api, &ResourceId::new(RESOURCE_TYPE, "odd"), "0aded5c1-0000/web/odd")
            .await
            .unwrap_err();
        assert_eq!(err.message, "received unsupported action type 'teleport'");
    }

    #[tokio::test]
    async fn delete_then_read_removes_from_state() {
        let api = FakeApi::new();
        let created = create(&api, &desired("to-api", 10)).await.unwrap();
        let identifier = created.identifier.clone().unwrap();

        delete(&api, &created.id, &identifier).await.unwrap();
        let state = read(&api, &created.id, &identifier).await.unwrap();
        assert!(!state.exists);
    }
}
