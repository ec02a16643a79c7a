//! Schema - Define type schemas for resources
//!
//! Providers define a schema for each resource type. Configuration is
//! validated against it before any API call is made.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use crate::resource::Value;

/// Attribute type
#[derive(Debug, Clone)]
pub enum AttributeType {
    /// String
    String,
    /// Integer
    Int,
    /// Boolean
    Bool,
    /// Enum (list of allowed values)
    Enum(Vec<String>),
    /// Custom type (with validation function)
    Custom {
        name: String,
        base: Box<AttributeType>,
        validate: fn(&Value) -> Result<(), String>,
    },
    /// Ordered list
    List(Box<AttributeType>),
    /// Unordered collection without duplicates
    Set(Box<AttributeType>),
    /// Map
    Map(Box<AttributeType>),
    /// Nested configuration block
    Block(BlockSchema),
}

impl AttributeType {
    /// Check if a value conforms to this type
    pub fn validate(&self, value: &Value) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();
        self.validate_at("value", value, &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_at(&self, path: &str, value: &Value, errors: &mut Vec<TypeError>) {
        match (self, value) {
            (AttributeType::String, Value::String(_))
            | (AttributeType::Int, Value::Int(_))
            | (AttributeType::Bool, Value::Bool(_)) => {}

            (AttributeType::Enum(variants), Value::String(s)) => {
                if !variants.iter().any(|v| v == s) {
                    errors.push(TypeError::InvalidEnumVariant {
                        path: path.to_string(),
                        value: s.clone(),
                        expected: variants.clone(),
                    });
                }
            }

            (AttributeType::Custom { validate, base, .. }, v) => {
                let before = errors.len();
                base.validate_at(path, v, errors);
                if errors.len() == before
                    && let Err(message) = validate(v)
                {
                    errors.push(TypeError::ValidationFailed {
                        path: path.to_string(),
                        message,
                    });
                }
            }

            (AttributeType::List(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate_at(&format!("{}.{}", path, i), item, errors);
                }
            }

            (AttributeType::Set(inner), Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    inner.validate_at(&format!("{}.{}", path, i), item, errors);
                    if items[..i].contains(item) {
                        errors.push(TypeError::DuplicateSetItem {
                            path: format!("{}.{}", path, i),
                        });
                    }
                }
            }

            (AttributeType::Map(inner), Value::Map(map)) => {
                for (k, v) in map {
                    inner.validate_at(&format!("{}.{}", path, k), v, errors);
                }
            }

            (AttributeType::Block(block), Value::List(items)) => {
                block.validate_items(path, items, errors);
            }

            _ => errors.push(TypeError::TypeMismatch {
                path: path.to_string(),
                expected: self.type_name(),
                got: value.type_name(),
            }),
        }
    }

    fn type_name(&self) -> String {
        match self {
            AttributeType::String => "String".to_string(),
            AttributeType::Int => "Int".to_string(),
            AttributeType::Bool => "Bool".to_string(),
            AttributeType::Enum(variants) => format!("Enum({})", variants.join(" | ")),
            AttributeType::Custom { name, .. } => name.clone(),
            AttributeType::List(inner) => format!("List<{}>", inner.type_name()),
            AttributeType::Set(inner) => format!("Set<{}>", inner.type_name()),
            AttributeType::Map(inner) => format!("Map<{}>", inner.type_name()),
            AttributeType::Block(_) => "Block".to_string(),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Type error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TypeError {
    #[error("{path}: type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        path: String,
        expected: String,
        got: String,
    },

    #[error("expected {path} to be one of [{}], got {value}", quote_all(.expected))]
    InvalidEnumVariant {
        path: String,
        value: String,
        expected: Vec<String>,
    },

    #[error("{path}: {message}")]
    ValidationFailed { path: String, message: String },

    #[error("Required attribute '{name}' is missing")]
    MissingRequired { name: String },

    #[error("Attribute '{name}' is computed and cannot be set")]
    ReadOnly { name: String },

    #[error("Unknown attribute '{name}'")]
    UnknownAttribute { name: String },

    #[error("{path}: expected at least {min} item(s), got {got}")]
    TooFewItems { path: String, min: usize, got: usize },

    #[error("{path}: expected at most {max} item(s), got {got}")]
    TooManyItems { path: String, max: usize, got: usize },

    #[error("{path}: duplicate set item")]
    DuplicateSetItem { path: String },

    #[error("\"{name}\": conflicts with {other}")]
    Conflict { name: String, other: String },

    #[error("{0}")]
    RuleFailed(String),
}

fn quote_all(values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("\"{}\"", v))
        .collect::<Vec<_>>()
        .join(" ")
}

impl Value {
    fn type_name(&self) -> String {
        match self {
            Value::String(_) => "String".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::List(_) => "List".to_string(),
            Value::Map(_) => "Map".to_string(),
        }
    }
}

/// Additional constraint checked after the type matched
#[derive(Debug, Clone)]
pub enum Validator {
    /// Character count within `min..=max`
    StringLenBetween(usize, usize),
    /// Integer within `min..=max`
    IntBetween(i64, i64),
    StringNotEmpty,
    Regex { pattern: Regex, message: String },
}

impl Validator {
    /// Build a regex validator. Panics on an invalid pattern, so only use literals.
    pub fn regex(pattern: &str, message: impl Into<String>) -> Self {
        Validator::Regex {
            pattern: Regex::new(pattern).expect("validator pattern must compile"),
            message: message.into(),
        }
    }

    pub fn check(&self, value: &Value) -> Result<(), String> {
        match (self, value) {
            (Validator::StringLenBetween(min, max), Value::String(s)) => {
                let len = s.chars().count();
                if len < *min || len > *max {
                    Err(format!(
                        "expected length to be in the range ({} - {}), got {}",
                        min, max, len
                    ))
                } else {
                    Ok(())
                }
            }
            (Validator::IntBetween(min, max), Value::Int(n)) => {
                if n < min || n > max {
                    Err(format!(
                        "expected to be in the range ({} - {}), got {}",
                        min, max, n
                    ))
                } else {
                    Ok(())
                }
            }
            (Validator::StringNotEmpty, Value::String(s)) => {
                if s.is_empty() {
                    Err("expected not to be an empty string".to_string())
                } else {
                    Ok(())
                }
            }
            (Validator::Regex { pattern, message }, Value::String(s)) => {
                if pattern.is_match(s) {
                    Ok(())
                } else {
                    Err(message.clone())
                }
            }
            _ => Ok(()),
        }
    }
}

/// Attribute schema
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub attr_type: AttributeType,
    pub required: bool,
    pub optional: bool,
    /// Set by the API. Read-only unless also optional.
    pub computed: bool,
    /// Changing this attribute replaces the resource
    pub force_new: bool,
    /// Masked in plan output
    pub sensitive: bool,
    pub default: Option<Value>,
    pub description: Option<String>,
    pub conflicts_with: Vec<String>,
    pub validators: Vec<Validator>,
}

impl AttributeSchema {
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            optional: false,
            computed: false,
            force_new: false,
            sensitive: false,
            default: None,
            description: None,
            conflicts_with: Vec::new(),
            validators: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.optional = true;
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn conflicts_with(mut self, others: &[&str]) -> Self {
        self.conflicts_with
            .extend(others.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    fn is_read_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

/// Schema of a nested block (list of attribute maps)
#[derive(Debug, Clone, Default)]
pub struct BlockSchema {
    pub attributes: HashMap<String, AttributeSchema>,
    pub min_items: usize,
    pub max_items: Option<usize>,
}

impl BlockSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn min_items(mut self, min: usize) -> Self {
        self.min_items = min;
        self
    }

    pub fn max_items(mut self, max: usize) -> Self {
        self.max_items = Some(max);
        self
    }

    fn validate_items(&self, path: &str, items: &[Value], errors: &mut Vec<TypeError>) {
        if items.len() < self.min_items {
            errors.push(TypeError::TooFewItems {
                path: path.to_string(),
                min: self.min_items,
                got: items.len(),
            });
        }
        if let Some(max) = self.max_items
            && items.len() > max
        {
            errors.push(TypeError::TooManyItems {
                path: path.to_string(),
                max,
                got: items.len(),
            });
        }
        for (i, item) in items.iter().enumerate() {
            let item_path = format!("{}.{}", path, i);
            match item {
                Value::Map(map) => validate_attributes(&self.attributes, map, &item_path, errors),
                other => errors.push(TypeError::TypeMismatch {
                    path: item_path,
                    expected: "Map".to_string(),
                    got: other.type_name(),
                }),
            }
        }
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn validate_attributes(
    schemas: &HashMap<String, AttributeSchema>,
    attributes: &HashMap<String, Value>,
    prefix: &str,
    errors: &mut Vec<TypeError>,
) {
    for (name, schema) in schemas {
        if schema.required && !attributes.contains_key(name) && schema.default.is_none() {
            errors.push(TypeError::MissingRequired {
                name: join_path(prefix, name),
            });
        }
    }

    for (name, value) in attributes {
        let path = join_path(prefix, name);
        let Some(schema) = schemas.get(name) else {
            errors.push(TypeError::UnknownAttribute { name: path });
            continue;
        };

        if schema.is_read_only() {
            errors.push(TypeError::ReadOnly { name: path });
            continue;
        }

        for other in &schema.conflicts_with {
            // Report each conflicting pair once
            if attributes.contains_key(other)
                && (name < other || !schemas.get(other).is_some_and(|o| o.conflicts_with.contains(name)))
            {
                errors.push(TypeError::Conflict {
                    name: path.clone(),
                    other: join_path(prefix, other),
                });
            }
        }

        let before = errors.len();
        schema.attr_type.validate_at(&path, value, errors);
        if errors.len() == before {
            for validator in &schema.validators {
                if let Err(message) = validator.check(value) {
                    errors.push(TypeError::ValidationFailed {
                        path: path.clone(),
                        message,
                    });
                }
            }
        }
    }
}

fn apply_defaults_to(schemas: &HashMap<String, AttributeSchema>, attributes: &mut HashMap<String, Value>) {
    for (name, schema) in schemas {
        if !attributes.contains_key(name)
            && let Some(default) = &schema.default
        {
            attributes.insert(name.clone(), default.clone());
        }
        if let AttributeType::Block(block) = &schema.attr_type
            && let Some(Value::List(items)) = attributes.get_mut(name)
        {
            for item in items.iter_mut() {
                if let Value::Map(map) = item {
                    apply_defaults_to(&block.attributes, map);
                }
            }
        }
    }
}

/// Resource-level rule checked after attribute validation
pub type ResourceRule = fn(&HashMap<String, Value>) -> Result<(), String>;

/// Resource schema
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: HashMap<String, AttributeSchema>,
    pub description: Option<String>,
    pub rules: Vec<ResourceRule>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: HashMap::new(),
            description: None,
            rules: Vec::new(),
        }
    }

    pub fn attribute(mut self, schema: AttributeSchema) -> Self {
        self.attributes.insert(schema.name.clone(), schema);
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn rule(mut self, rule: ResourceRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Look up an attribute schema by name
    pub fn get(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    /// Validate resource attributes
    pub fn validate(&self, attributes: &HashMap<String, Value>) -> Result<(), Vec<TypeError>> {
        let mut errors = Vec::new();

        validate_attributes(&self.attributes, attributes, "", &mut errors);

        // Rules assume well-typed input
        if errors.is_empty() {
            for rule in &self.rules {
                if let Err(message) = rule(attributes) {
                    errors.push(TypeError::RuleFailed(message));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Fill in default values, including inside nested blocks
    pub fn apply_defaults(&self, attributes: &mut HashMap<String, Value>) {
        apply_defaults_to(&self.attributes, attributes);
    }

    /// Whether the attribute is marked sensitive
    pub fn is_sensitive(&self, name: &str) -> bool {
        self.attributes.get(name).is_some_and(|a| a.sensitive)
    }
}

/// Helper functions for common types
pub mod types {
    use super::*;

    /// CIDR block type (e.g., "10.0.0.0/16" or "fd00::/64")
    pub fn cidr() -> AttributeType {
        AttributeType::Custom {
            name: "Cidr".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| {
                if let Value::String(s) = value {
                    validate_cidr(s)
                } else {
                    Err("Expected string".to_string())
                }
            },
        }
    }

    /// IPv4 or IPv6 address type
    pub fn ip_address() -> AttributeType {
        AttributeType::Custom {
            name: "IpAddress".to_string(),
            base: Box::new(AttributeType::String),
            validate: |value| {
                if let Value::String(s) = value {
                    s.parse::<std::net::IpAddr>()
                        .map(|_| ())
                        .map_err(|_| format!("expected a valid IP address, got '{}'", s))
                } else {
                    Err("Expected string".to_string())
                }
            },
        }
    }
}

/// Validate CIDR block format (e.g., "10.0.0.0/16", "2001:db8::/32")
pub fn validate_cidr(cidr: &str) -> Result<(), String> {
    let Some((ip, prefix)) = cidr.split_once('/') else {
        return Err(format!(
            "Invalid CIDR format '{}': expected IP/prefix",
            cidr
        ));
    };

    let max_prefix = match ip.parse::<std::net::IpAddr>() {
        Ok(std::net::IpAddr::V4(_)) => 32,
        Ok(std::net::IpAddr::V6(_)) => 128,
        Err(_) => return Err(format!("Invalid IP address '{}' in CIDR", ip)),
    };

    match prefix.parse::<u8>() {
        Ok(p) if p <= max_prefix => Ok(()),
        Ok(p) => Err(format!(
            "Invalid prefix length '{}': must be 0-{}",
            p, max_prefix
        )),
        Err(_) => Err(format!(
            "Invalid prefix length '{}': must be a number",
            prefix
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn validate_string_type() {
        let t = AttributeType::String;
        assert!(t.validate(&s("hello")).is_ok());
        assert!(t.validate(&Value::Int(42)).is_err());
    }

    #[test]
    fn enum_error_lists_quoted_variants() {
        let t = AttributeType::Enum(vec!["http".to_string(), "https".to_string()]);
        assert!(t.validate(&s("https")).is_ok());

        let errors = t.validate(&s("invalid")).unwrap_err();
        assert_eq!(
            errors[0].to_string(),
            "expected value to be one of [\"http\" \"https\"], got invalid"
        );
    }

    #[test]
    fn validate_resource_schema() {
        let schema = ResourceSchema::new("resource")
            .attribute(AttributeSchema::new("name", AttributeType::String).required())
            .attribute(AttributeSchema::new("count", AttributeType::Int).optional())
            .attribute(AttributeSchema::new("enabled", AttributeType::Bool).optional());

        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), s("my-resource"));
        attrs.insert("count".to_string(), Value::Int(5));
        attrs.insert("enabled".to_string(), Value::Bool(true));

        assert!(schema.validate(&attrs).is_ok());
    }

    #[test]
    fn missing_required_attribute() {
        let schema = ResourceSchema::new("network")
            .attribute(AttributeSchema::new("name", AttributeType::String).required());

        let errors = schema.validate(&HashMap::new()).unwrap_err();
        assert!(matches!(&errors[0], TypeError::MissingRequired { name } if name == "name"));
    }

    #[test]
    fn computed_only_attribute_is_read_only() {
        let schema = ResourceSchema::new("network")
            .attribute(AttributeSchema::new("type", AttributeType::String).computed());

        let attrs = HashMap::from([("type".to_string(), s("private"))]);
        let errors = schema.validate(&attrs).unwrap_err();
        assert!(matches!(&errors[0], TypeError::ReadOnly { .. }));
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let schema = ResourceSchema::new("network");
        let attrs = HashMap::from([("nmae".to_string(), s("typo"))]);
        let errors = schema.validate(&attrs).unwrap_err();
        assert!(matches!(&errors[0], TypeError::UnknownAttribute { name } if name == "nmae"));
    }

    #[test]
    fn conflicting_attributes_reported_once() {
        let schema = ResourceSchema::new("user")
            .attribute(
                AttributeSchema::new("a", AttributeType::String)
                    .optional()
                    .conflicts_with(&["b"]),
            )
            .attribute(
                AttributeSchema::new("b", AttributeType::String)
                    .optional()
                    .conflicts_with(&["a"]),
            );

        let attrs = HashMap::from([("a".to_string(), s("x")), ("b".to_string(), s("y"))]);
        let errors = schema.validate(&attrs).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "\"a\": conflicts with b");
    }

    #[test]
    fn block_item_bounds_and_nested_paths() {
        let block = BlockSchema::new()
            .attribute(
                AttributeSchema::new("status", AttributeType::Int)
                    .required()
                    .with_validator(Validator::IntBetween(100, 599)),
            )
            .min_items(1)
            .max_items(1);
        let schema = ResourceSchema::new("rule")
            .attribute(AttributeSchema::new("http_return", AttributeType::Block(block)).required());

        let item = |status: i64| Value::Map(HashMap::from([("status".to_string(), Value::Int(status))]));

        let ok = HashMap::from([("http_return".to_string(), Value::List(vec![item(404)]))]);
        assert!(schema.validate(&ok).is_ok());

        let too_many = HashMap::from([(
            "http_return".to_string(),
            Value::List(vec![item(404), item(200)]),
        )]);
        let errors = schema.validate(&too_many).unwrap_err();
        assert!(matches!(&errors[0], TypeError::TooManyItems { max: 1, got: 2, .. }));

        let out_of_range = HashMap::from([("http_return".to_string(), Value::List(vec![item(42)]))]);
        let errors = schema.validate(&out_of_range).unwrap_err();
        assert!(errors[0].to_string().starts_with("http_return.0.status:"));
    }

    #[test]
    fn string_length_counts_characters() {
        let v = Validator::StringLenBetween(8, 256);
        assert!(v.check(&s("password")).is_ok());
        assert!(v.check(&s("short")).is_err());
        assert!(v.check(&s("ääääääää")).is_ok());
    }

    #[test]
    fn set_rejects_duplicates() {
        let t = AttributeType::Set(Box::new(types::ip_address()));
        assert!(t.validate(&Value::string_list(["10.0.0.1", "10.0.0.2"])).is_ok());
        assert!(t.validate(&Value::string_list(["10.0.0.1", "10.0.0.1"])).is_err());
        assert!(t.validate(&Value::string_list(["not-an-ip"])).is_err());
    }

    #[test]
    fn defaults_fill_nested_blocks() {
        let block = BlockSchema::new().attribute(
            AttributeSchema::new("allow_replication", AttributeType::Bool)
                .with_default(Value::Bool(true)),
        );
        let schema = ResourceSchema::new("user")
            .attribute(
                AttributeSchema::new("authentication", AttributeType::String)
                    .with_default(s("caching_sha2_password")),
            )
            .attribute(AttributeSchema::new("pg_access_control", AttributeType::Block(block)).optional());

        let mut attrs = HashMap::from([(
            "pg_access_control".to_string(),
            Value::block(HashMap::new()),
        )]);
        schema.apply_defaults(&mut attrs);

        assert_eq!(attrs.get("authentication"), Some(&s("caching_sha2_password")));
        let pg = attrs.get("pg_access_control").unwrap().first_block().unwrap();
        assert_eq!(pg.get("allow_replication"), Some(&Value::Bool(true)));
    }

    #[test]
    fn rules_run_after_attribute_validation() {
        let schema = ResourceSchema::new("rule")
            .attribute(AttributeSchema::new("name", AttributeType::String).optional())
            .rule(|attrs| {
                if attrs.is_empty() {
                    Err("at least one attribute".to_string())
                } else {
                    Ok(())
                }
            });

        let errors = schema.validate(&HashMap::new()).unwrap_err();
        assert_eq!(errors[0].to_string(), "at least one attribute");
    }

    #[test]
    fn validate_cidr_type() {
        let t = types::cidr();

        assert!(t.validate(&s("10.0.0.0/16")).is_ok());
        assert!(t.validate(&s("0.0.0.0/0")).is_ok());
        assert!(t.validate(&s("255.255.255.255/32")).is_ok());
        assert!(t.validate(&s("2001:db8::/32")).is_ok());
        assert!(t.validate(&s("fd00::/128")).is_ok());

        assert!(t.validate(&s("10.0.0.0")).is_err()); // no prefix
        assert!(t.validate(&s("10.0.0.0/33")).is_err());
        assert!(t.validate(&s("fd00::/129")).is_err());
        assert!(t.validate(&s("10.0.0.256/16")).is_err());
        assert!(t.validate(&s("10.0.0/16")).is_err());
        assert!(t.validate(&s("invalid")).is_err());
        assert!(t.validate(&Value::Int(42)).is_err());
    }
}
