//! Provider configuration
//!
//! Credentials come from the environment and can be overridden by the
//! `provider` block of the configuration file.

use std::collections::HashMap;
use std::time::Duration;

use nimbus_core::resource::Value;

pub const DEFAULT_API_URL: &str = "https://api.upcloud.com/1.3";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(20 * 60);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "UpCloud credentials are missing: set UPCLOUD_USERNAME and UPCLOUD_PASSWORD or provide username and password in the provider block"
    )]
    MissingCredentials,

    #[error("Invalid value for provider attribute '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unknown provider attribute '{0}'")]
    UnknownAttribute(String),
}

#[derive(Clone)]
pub struct ProviderConfig {
    pub username: String,
    pub password: String,
    pub api_url: String,
    /// Timeout of a single HTTP request
    pub request_timeout: Duration,
    /// Interval between readiness polls
    pub poll_interval: Duration,
    pub create_timeout: Duration,
    pub update_timeout: Duration,
    pub delete_timeout: Duration,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("username", &self.username)
            .field("password", &"(sensitive)")
            .field("api_url", &self.api_url)
            .field("request_timeout", &self.request_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("create_timeout", &self.create_timeout)
            .field("update_timeout", &self.update_timeout)
            .field("delete_timeout", &self.delete_timeout)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            create_timeout: DEFAULT_OPERATION_TIMEOUT,
            update_timeout: DEFAULT_OPERATION_TIMEOUT,
            delete_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl ProviderConfig {
    /// Read `UPCLOUD_USERNAME`, `UPCLOUD_PASSWORD` and `UPCLOUD_API_URL`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(username) = lookup("UPCLOUD_USERNAME") {
            config.username = username;
        }
        if let Some(password) = lookup("UPCLOUD_PASSWORD") {
            config.password = password;
        }
        if let Some(api_url) = lookup("UPCLOUD_API_URL").filter(|u| !u.is_empty()) {
            config.api_url = api_url;
        }
        config
    }

    /// Override settings with attributes of a provider block
    pub fn merge_attributes(&mut self, attributes: &HashMap<String, Value>) -> Result<(), ConfigError> {
        for (key, value) in attributes {
            match key.as_str() {
                "username" => self.username = string_value(key, value)?,
                "password" => self.password = string_value(key, value)?,
                "api_url" => self.api_url = string_value(key, value)?,
                "request_timeout_secs" => self.request_timeout = secs_value(key, value)?,
                "poll_interval_secs" => self.poll_interval = secs_value(key, value)?,
                "create_timeout_secs" => self.create_timeout = secs_value(key, value)?,
                "update_timeout_secs" => self.update_timeout = secs_value(key, value)?,
                "delete_timeout_secs" => self.delete_timeout = secs_value(key, value)?,
                // Selects the provider; not a setting
                "name" => {}
                other => return Err(ConfigError::UnknownAttribute(other.to_string())),
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(ConfigError::MissingCredentials);
        }
        Ok(())
    }
}

fn string_value(key: &str, value: &Value) -> Result<String, ConfigError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: "expected a string".to_string(),
        })
}

fn secs_value(key: &str, value: &Value) -> Result<Duration, ConfigError> {
    match value.as_int() {
        Some(n) if n > 0 => Ok(Duration::from_secs(n as u64)),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "expected a positive number of seconds".to_string(),
        }),
    }
}
