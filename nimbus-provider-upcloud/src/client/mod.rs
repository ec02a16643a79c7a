//! UpCloud API client
//!
//! `UpcloudApi` has one method per API call used by the resource handlers.
//! `HttpClient` implements it over HTTPS; tests substitute an in-memory fake.

mod http;
pub mod types;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use serde::Deserialize;

pub use http::HttpClient;
pub use types::*;

/// Error returned by the UpCloud API client
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Error document returned by the API
    #[error("{title} ({problem_type}, status {status})")]
    Problem {
        problem_type: String,
        title: String,
        status: u16,
    },

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode API response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Problem document (`application/problem+json`)
#[derive(Debug, Deserialize)]
struct ProblemBody {
    #[serde(rename = "type", default)]
    problem_type: String,
    #[serde(default)]
    title: String,
}

/// Legacy error document (`{"error": {"error_code", "error_message"}}`)
#[derive(Debug, Deserialize)]
struct LegacyErrorBody {
    error: LegacyError,
}

#[derive(Debug, Deserialize)]
struct LegacyError {
    error_code: String,
    error_message: String,
}

impl ApiError {
    pub fn problem(status: u16, problem_type: impl Into<String>, title: impl Into<String>) -> Self {
        ApiError::Problem {
            problem_type: problem_type.into(),
            title: title.into(),
            status,
        }
    }

    /// Build an error from a non-success response body
    pub fn from_response(status: u16, body: &str) -> Self {
        if let Ok(legacy) = serde_json::from_str::<LegacyErrorBody>(body) {
            return Self::problem(status, legacy.error.error_code, legacy.error.error_message);
        }
        match serde_json::from_str::<ProblemBody>(body) {
            Ok(p) if !p.title.is_empty() || !p.problem_type.is_empty() => {
                Self::problem(status, p.problem_type, p.title)
            }
            _ => Self::problem(status, "UNKNOWN_ERROR", format!("HTTP {}", status)),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            ApiError::Problem {
                status,
                problem_type,
                ..
            } => *status == 404 || problem_type.ends_with("NOT_FOUND"),
            _ => false,
        }
    }

    /// Title shown as the summary of diagnostics
    pub fn title(&self) -> String {
        match self {
            ApiError::Problem { title, .. } => title.clone(),
            other => other.to_string(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Calls against the UpCloud API
#[async_trait]
pub trait UpcloudApi: Send + Sync {
    // Managed databases

    async fn get_managed_database(&self, uuid: &str) -> ApiResult<ManagedDatabase>;

    async fn create_managed_database_user(
        &self,
        service_uuid: &str,
        request: &CreateManagedDatabaseUserRequest,
    ) -> ApiResult<ManagedDatabaseUser>;

    async fn get_managed_database_user(
        &self,
        service_uuid: &str,
        username: &str,
    ) -> ApiResult<ManagedDatabaseUser>;

    async fn modify_managed_database_user(
        &self,
        service_uuid: &str,
        username: &str,
        request: &ModifyManagedDatabaseUserRequest,
    ) -> ApiResult<ManagedDatabaseUser>;

    async fn modify_managed_database_user_access_control(
        &self,
        service_uuid: &str,
        username: &str,
        access_control: &ManagedDatabaseUserAccessControl,
    ) -> ApiResult<()>;

    async fn delete_managed_database_user(
        &self,
        service_uuid: &str,
        username: &str,
    ) -> ApiResult<()>;

    // Networks

    async fn create_network(&self, request: &CreateNetworkRequest) -> ApiResult<Network>;

    async fn get_network_details(&self, uuid: &str) -> ApiResult<Network>;

    async fn modify_network(
        &self,
        uuid: &str,
        request: &ModifyNetworkRequest,
    ) -> ApiResult<Network>;

    async fn delete_network(&self, uuid: &str) -> ApiResult<()>;

    async fn attach_network_router(&self, network_uuid: &str, router_uuid: &str) -> ApiResult<()>;

    async fn detach_network_router(&self, network_uuid: &str) -> ApiResult<()>;

    // Load balancer frontend rules

    async fn create_load_balancer_frontend_rule(
        &self,
        load_balancer_uuid: &str,
        frontend: &str,
        rule: &LoadBalancerFrontendRule,
    ) -> ApiResult<LoadBalancerFrontendRule>;

    async fn get_load_balancer_frontend_rule(
        &self,
        load_balancer_uuid: &str,
        frontend: &str,
        name: &str,
    ) -> ApiResult<LoadBalancerFrontendRule>;

    async fn modify_load_balancer_frontend_rule(
        &self,
        load_balancer_uuid: &str,
        frontend: &str,
        name: &str,
        request: &ModifyLoadBalancerFrontendRuleRequest,
    ) -> ApiResult<LoadBalancerFrontendRule>;

    async fn delete_load_balancer_frontend_rule(
        &self,
        load_balancer_uuid: &str,
        frontend: &str,
        name: &str,
    ) -> ApiResult<()>;
}
