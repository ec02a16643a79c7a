//! HTTP implementation of `UpcloudApi`

use async_trait::async_trait;
use log::{debug, error};
use reqwest::{Client, Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::types::*;
use super::{ApiError, ApiResult, UpcloudApi};
use crate::config::ProviderConfig;

/// Maximum length of response body to log
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Truncate and strip control characters from a body before logging it
fn sanitize_for_log(body: &str) -> String {
    let truncated = match body.char_indices().nth(MAX_LOG_BODY_LENGTH) {
        Some((idx, _)) => format!("{}... [truncated, {} bytes total]", &body[..idx], body.len()),
        None => body.to_string(),
    };
    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// UpCloud API client over HTTPS with basic authentication
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
}

impl HttpClient {
    pub fn new(config: &ProviderConfig) -> ApiResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("nimbus/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()?;

        let base_url = Url::parse(config.api_url.trim_end_matches('/'))
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", config.api_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(config.api_url.clone()));
        }

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Resolve path segments against the base URL, percent-encoding each one
    fn url(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn request(
        &self,
        method: Method,
        path: &[&str],
        body: Option<serde_json::Value>,
    ) -> ApiResult<String> {
        let url = self.url(path)?;
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!("API error: {} - {}", status, sanitize_for_log(&text));
            return Err(ApiError::from_response(status.as_u16(), &text));
        }

        Ok(text)
    }

    async fn get<T: DeserializeOwned>(&self, path: &[&str]) -> ApiResult<T> {
        let text = self.request(Method::GET, path, None).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &[&str],
        body: &B,
    ) -> ApiResult<T> {
        let body = serde_json::to_value(body)?;
        let text = self.request(method, path, Some(body)).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Send a request whose response body is ignored
    async fn send_no_content(
        &self,
        method: Method,
        path: &[&str],
        body: Option<serde_json::Value>,
    ) -> ApiResult<()> {
        self.request(method, path, body).await.map(|_| ())
    }
}

fn user_path<'a>(service_uuid: &'a str, username: &'a str) -> [&'a str; 4] {
    ["database", service_uuid, "users", username]
}

fn rule_path<'a>(load_balancer_uuid: &'a str, frontend: &'a str, name: &'a str) -> [&'a str; 6] {
    ["load-balancer", load_balancer_uuid, "frontends", frontend, "rules", name]
}

#[async_trait]
impl UpcloudApi for HttpClient {
    async fn get_managed_database(&self, uuid: &str) -> ApiResult<ManagedDatabase> {
        self.get(&["database", uuid]).await
    }

    async fn create_managed_database_user(
        &self,
        service_uuid: &str,
        request: &CreateManagedDatabaseUserRequest,
    ) -> ApiResult<ManagedDatabaseUser> {
        self.send(
            Method::POST,
            &["database", service_uuid, "users"],
            request,
        )
        .await
    }

    async fn get_managed_database_user(
        &self,
        service_uuid: &str,
        username: &str,
    ) -> ApiResult<ManagedDatabaseUser> {
        self.get(&user_path(service_uuid, username)).await
    }

    async fn modify_managed_database_user(
        &self,
        service_uuid: &str,
        username: &str,
        request: &ModifyManagedDatabaseUserRequest,
    ) -> ApiResult<ManagedDatabaseUser> {
        self.send(Method::PATCH, &user_path(service_uuid, username), request)
            .await
    }

    async fn modify_managed_database_user_access_control(
        &self,
        service_uuid: &str,
        username: &str,
        access_control: &ManagedDatabaseUserAccessControl,
    ) -> ApiResult<()> {
        let path = ["database", service_uuid, "users", username, "access-control"];
        self.send_no_content(Method::PATCH, &path, Some(serde_json::to_value(access_control)?))
            .await
    }

    async fn delete_managed_database_user(
        &self,
        service_uuid: &str,
        username: &str,
    ) -> ApiResult<()> {
        self.send_no_content(Method::DELETE, &user_path(service_uuid, username), None)
            .await
    }

    async fn create_network(&self, request: &CreateNetworkRequest) -> ApiResult<Network> {
        let envelope: NetworkEnvelope<Network> = self
            .send(Method::POST, &["network"], &NetworkEnvelope { network: request })
            .await?;
        Ok(envelope.network)
    }

    async fn get_network_details(&self, uuid: &str) -> ApiResult<Network> {
        let envelope: NetworkEnvelope<Network> = self.get(&["network", uuid]).await?;
        Ok(envelope.network)
    }

    async fn modify_network(
        &self,
        uuid: &str,
        request: &ModifyNetworkRequest,
    ) -> ApiResult<Network> {
        let envelope: NetworkEnvelope<Network> = self
            .send(
                Method::PUT,
                &["network", uuid],
                &NetworkEnvelope { network: request },
            )
            .await?;
        Ok(envelope.network)
    }

    async fn delete_network(&self, uuid: &str) -> ApiResult<()> {
        self.send_no_content(Method::DELETE, &["network", uuid], None)
            .await
    }

    async fn attach_network_router(&self, network_uuid: &str, router_uuid: &str) -> ApiResult<()> {
        self.send_no_content(
            Method::PUT,
            &["network", network_uuid],
            Some(json!({"network": {"router": router_uuid}})),
        )
        .await
    }

    async fn detach_network_router(&self, network_uuid: &str) -> ApiResult<()> {
        self.send_no_content(
            Method::PUT,
            &["network", network_uuid],
            Some(json!({"network": {"router": null}})),
        )
        .await
    }

    async fn create_load_balancer_frontend_rule(
        &self,
        load_balancer_uuid: &str,
        frontend: &str,
        rule: &LoadBalancerFrontendRule,
    ) -> ApiResult<LoadBalancerFrontendRule> {
        self.send(
            Method::POST,
            &["load-balancer", load_balancer_uuid, "frontends", frontend, "rules"],
            rule,
        )
        .await
    }

    async fn get_load_balancer_frontend_rule(
        &self,
        load_balancer_uuid: &str,
        frontend: &str,
        name: &str,
    ) -> ApiResult<LoadBalancerFrontendRule> {
        self.get(&rule_path(load_balancer_uuid, frontend, name))
            .await
    }

    async fn modify_load_balancer_frontend_rule(
        &self,
        load_balancer_uuid: &str,
        frontend: &str,
        name: &str,
        request: &ModifyLoadBalancerFrontendRuleRequest,
    ) -> ApiResult<LoadBalancerFrontendRule> {
        self.send(
            Method::PATCH,
            &rule_path(load_balancer_uuid, frontend, name),
            request,
        )
        .await
    }

    async fn delete_load_balancer_frontend_rule(
        &self,
        load_balancer_uuid: &str,
        frontend: &str,
        name: &str,
    ) -> ApiResult<()> {
        self.send_no_content(
            Method::DELETE,
            &rule_path(load_balancer_uuid, frontend, name),
            None,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let logged = sanitize_for_log(&body);
        assert!(logged.starts_with(&"x".repeat(200)));
        assert!(logged.ends_with("[truncated, 500 bytes total]"));
    }

    #[test]
    fn sanitize_strips_control_characters() {
        assert_eq!(sanitize_for_log("line1\nline2\t!"), "line1line2!");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = ProviderConfig {
            api_url: "http://localhost:8080/1.3/".to_string(),
            ..Default::default()
        };
        let client = HttpClient::new(&config).unwrap();
        assert_eq!(client.base_url.as_str(), "http://localhost:8080/1.3");
    }

    #[test]
    fn segments_are_encoded_under_base_path() {
        let config = ProviderConfig {
            api_url: "http://localhost:8080/1.3/".to_string(),
            ..Default::default()
        };
        let client = HttpClient::new(&config).unwrap();
        let url = client.url(&user_path("09a1b2c3", "ops team/admin")).unwrap();
        assert_eq!(url.path(), "/1.3/database/09a1b2c3/users/ops%20team%2Fadmin");
    }

    #[test]
    fn invalid_api_url_is_rejected() {
        let config = ProviderConfig {
            api_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(HttpClient::new(&config), Err(ApiError::InvalidUrl(_))));
    }
}
