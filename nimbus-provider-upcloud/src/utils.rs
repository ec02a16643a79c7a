//! Helpers shared by the resource handlers
//!
//! Sub-resources are identified by their parent's UUID and their own name
//! joined with `/`, e.g. `<serviceUUID>/<username>`.

use log::warn;
use nimbus_core::provider::{Diagnostic, ProviderError, ProviderResult};
use nimbus_core::resource::{ResourceId, State};

use crate::client::ApiError;

const SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("invalid ID \"{id}\": expected {expected} parts separated by '/', got {got}")]
    WrongPartCount {
        id: String,
        expected: usize,
        got: usize,
    },

    #[error("invalid ID \"{id}\": part {index} is empty")]
    EmptyPart { id: String, index: usize },
}

/// Join identifier parts with `/`
pub fn build_sub_resource_id(parts: &[&str]) -> String {
    parts.join("/")
}

/// Split an identifier into exactly `n` non-empty parts
pub fn split_sub_resource_id(id: &str, n: usize) -> Result<Vec<String>, IdError> {
    let parts: Vec<&str> = id.split(SEPARATOR).collect();
    if parts.len() != n {
        return Err(IdError::WrongPartCount {
            id: id.to_string(),
            expected: n,
            got: parts.len(),
        });
    }
    if let Some(index) = parts.iter().position(|p| p.is_empty()) {
        return Err(IdError::EmptyPart {
            id: id.to_string(),
            index,
        });
    }
    Ok(parts.into_iter().map(str::to_string).collect())
}

fn split_parts<const N: usize>(id: &str) -> Result<[String; N], IdError> {
    let parts = split_sub_resource_id(id, N)?;
    Ok(std::array::from_fn(|i| parts[i].clone()))
}

/// Split `<serviceUUID>/<username>`
pub fn split_managed_database_sub_resource_id(id: &str) -> Result<(String, String), IdError> {
    let [service, username] = split_parts(id)?;
    Ok((service, username))
}

/// Split `<loadBalancerUUID>/<frontendName>`
pub fn split_frontend_id(id: &str) -> Result<(String, String), IdError> {
    let [lb, frontend] = split_parts(id)?;
    Ok((lb, frontend))
}

/// Split `<loadBalancerUUID>/<frontendName>/<ruleName>`
pub fn split_frontend_rule_id(id: &str) -> Result<(String, String, String), IdError> {
    let [lb, frontend, rule] = split_parts(id)?;
    Ok((lb, frontend, rule))
}

/// Wrap an identifier error with resource context
pub fn id_error(id: &ResourceId, err: IdError) -> ProviderError {
    ProviderError::new(err.to_string())
        .for_resource(id.clone())
        .with_cause(err)
}

/// Wrap an API error with resource context
pub fn api_error(id: &ResourceId, action: &str, err: ApiError) -> ProviderError {
    ProviderError::new(format!("{}: {}", action, err))
        .for_resource(id.clone())
        .with_cause(err)
}

/// Map a read failure: "not found" drops the resource from state with a warning
pub fn handle_read_error(id: &ResourceId, remote_name: &str, err: ApiError) -> ProviderResult<State> {
    if !err.is_not_found() {
        return Err(api_error(id, "Failed to read resource", err));
    }

    warn!("{} ({}) no longer exists, removing from state", id, remote_name);
    let detail = format!(
        "Binding to an existing remote object '{}' will be removed from the state. Next plan will include action to re-create the object if you choose to keep it in config.",
        remote_name
    );
    Ok(State::not_found(id.clone()).with_diagnostic(Diagnostic::warning(err.title(), detail)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::provider::Severity;

    #[test]
    fn build_and_split_round_trip() {
        let id = build_sub_resource_id(&["09a1b2c3", "app"]);
        assert_eq!(id, "09a1b2c3/app");
        assert_eq!(
            split_managed_database_sub_resource_id(&id).unwrap(),
            ("09a1b2c3".to_string(), "app".to_string())
        );
    }

    #[test]
    fn split_rejects_missing_separator() {
        assert_eq!(
            split_sub_resource_id("09a1b2c3", 2),
            Err(IdError::WrongPartCount {
                id: "09a1b2c3".to_string(),
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn split_rejects_empty_parts() {
        assert!(matches!(
            split_sub_resource_id("/app", 2),
            Err(IdError::EmptyPart { index: 0, .. })
        ));
        assert!(matches!(
            split_sub_resource_id("09a1b2c3/", 2),
            Err(IdError::EmptyPart { index: 1, .. })
        ));
    }

    #[test]
    fn split_rejects_extra_parts() {
        assert!(split_managed_database_sub_resource_id("a/b/c").is_err());
        assert_eq!(
            split_frontend_rule_id("0aded5c1/web/r1").unwrap(),
            (
                "0aded5c1".to_string(),
                "web".to_string(),
                "r1".to_string()
            )
        );
    }

    #[test]
    fn not_found_read_becomes_warning() {
        let id = ResourceId::new("network", "lan");
        let err = ApiError::problem(404, "NETWORK_NOT_FOUND", "Network not found");
        let state = handle_read_error(&id, "03e4", err).unwrap();

        assert!(!state.exists);
        assert_eq!(state.diagnostics.len(), 1);
        assert_eq!(state.diagnostics[0].severity, Severity::Warning);
        assert_eq!(state.diagnostics[0].summary, "Network not found");
        assert!(state.diagnostics[0].detail.contains("'03e4' will be removed"));
    }

    #[test]
    fn other_read_errors_propagate() {
        let id = ResourceId::new("network", "lan");
        let err = ApiError::problem(500, "INTERNAL", "boom");
        let err = handle_read_error(&id, "03e4", err).unwrap_err();
        assert!(err.to_string().starts_with("[network.lan] Failed to read resource"));
    }
}
