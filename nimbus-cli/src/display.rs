//! Plan and state rendering

use std::collections::HashMap;

use colored::Colorize;
use nimbus_core::effect::Effect;
use nimbus_core::plan::Plan;
use nimbus_core::provider::{Diagnostic, Severity};
use nimbus_core::resource::Value;
use nimbus_core::schema::ResourceSchema;

const SENSITIVE: &str = "(sensitive)";

pub fn print_plan(plan: &Plan, schemas: &HashMap<String, ResourceSchema>) {
    if plan.is_empty() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        let schema = schemas.get(&effect.resource_id().resource_type);
        print_effect(effect, schema);
    }

    println!();
    println!("{}", plan.summary().to_string().bold());
}

fn print_effect(effect: &Effect, schema: Option<&ResourceSchema>) {
    let symbol = match effect {
        Effect::Create(_) => effect.symbol().green().bold(),
        Effect::Update { .. } => effect.symbol().yellow().bold(),
        Effect::Replace { .. } => effect.symbol().magenta().bold(),
        Effect::Delete { .. } => effect.symbol().red().bold(),
    };
    let id = effect.resource_id();
    let attr_prefix = "      ";

    match effect {
        Effect::Create(r) => {
            println!("  {} {}", symbol, id.to_string().cyan().bold());
            for key in sorted_keys(r.attributes.keys()) {
                println!(
                    "{}{}: {}",
                    attr_prefix,
                    key,
                    format_attribute(schema, key, &r.attributes[key]).green()
                );
            }
        }
        Effect::Update {
            from,
            to,
            changed_attributes,
            ..
        }
        | Effect::Replace {
            from,
            to,
            changed_attributes,
            ..
        } => {
            println!("  {} {}", symbol, id.to_string().cyan().bold());
            for key in changed_attributes {
                let old = from
                    .attributes
                    .get(key)
                    .map(|v| format_attribute(schema, key, v))
                    .unwrap_or_else(|| "(none)".to_string());
                let new = to
                    .attributes
                    .get(key)
                    .map(|v| format_attribute(schema, key, v))
                    .unwrap_or_else(|| "(none)".to_string());
                let forces = matches!(effect, Effect::Replace { .. })
                    && schema.and_then(|s| s.get(key)).is_some_and(|a| a.force_new);
                println!(
                    "{}{}: {} → {}{}",
                    attr_prefix,
                    key,
                    old.red(),
                    new.green(),
                    if forces { " (forces replacement)".magenta().to_string() } else { String::new() }
                );
            }
        }
        Effect::Delete { from, .. } => {
            println!("  {} {}", symbol, id.to_string().cyan().bold());
            if let Some(identifier) = &from.identifier {
                println!("{}{}: {}", attr_prefix, "id".bold(), identifier.red());
            }
        }
    }
}

/// Sort with "name" first, then alphabetically
fn sorted_keys<'a>(keys: impl Iterator<Item = &'a String>) -> Vec<&'a String> {
    let mut keys: Vec<_> = keys.filter(|k| !k.starts_with('_')).collect();
    keys.sort_by(|a, b| match (a.as_str(), b.as_str()) {
        ("name", _) => std::cmp::Ordering::Less,
        (_, "name") => std::cmp::Ordering::Greater,
        _ => a.cmp(b),
    });
    keys
}

/// Format an attribute value, masking sensitive ones
pub fn format_attribute(schema: Option<&ResourceSchema>, key: &str, value: &Value) -> String {
    if schema.is_some_and(|s| s.is_sensitive(key)) {
        return SENSITIVE.to_string();
    }
    format_value(value)
}

pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let mut keys: Vec<_> = map.keys().collect();
            keys.sort();
            let strs: Vec<_> = keys
                .into_iter()
                .map(|k| format!("{}: {}", k, format_value(&map[k])))
                .collect();
            format!("{{{}}}", strs.join(", "))
        }
    }
}

pub fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        let text = diagnostic.to_string();
        match diagnostic.severity {
            Severity::Warning => eprintln!("{}", text.yellow()),
            Severity::Error => eprintln!("{}", text.red()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::schema::{AttributeSchema, AttributeType};

    #[test]
    fn format_nested_values() {
        let block = Value::block(HashMap::from([
            ("value".to_string(), Value::String("GET".to_string())),
            ("inverse".to_string(), Value::Bool(false)),
        ]));
        assert_eq!(format_value(&block), "[{inverse: false, value: \"GET\"}]");
        assert_eq!(format_value(&Value::Int(42)), "42");
    }

    #[test]
    fn sensitive_attributes_are_masked() {
        let schema = ResourceSchema::new("managed_database_user")
            .attribute(AttributeSchema::new("username", AttributeType::String).required())
            .attribute(AttributeSchema::new("password", AttributeType::String).sensitive());
        let secret = Value::String("hunter22".to_string());

        assert_eq!(format_attribute(Some(&schema), "password", &secret), "(sensitive)");
        assert_eq!(format_attribute(Some(&schema), "username", &secret), "\"hunter22\"");
        assert_eq!(format_attribute(None, "password", &secret), "\"hunter22\"");
    }

    #[test]
    fn name_sorts_first() {
        let keys = ["zone".to_string(), "name".to_string(), "_internal".to_string(), "ip".to_string()];
        let sorted = sorted_keys(keys.iter());
        assert_eq!(sorted, vec!["name", "ip", "zone"]);
    }
}
