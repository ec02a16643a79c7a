//! Request and response bodies of the UpCloud API

use serde::{Deserialize, Serialize};

// =============================================================================
// Managed Databases
// =============================================================================

/// Database service the user belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagedDatabaseServiceType {
    Mysql,
    Pg,
    Redis,
    #[serde(rename = "opensearch")]
    OpenSearch,
    #[default]
    #[serde(other)]
    Unknown,
}

impl ManagedDatabaseServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagedDatabaseServiceType::Mysql => "mysql",
            ManagedDatabaseServiceType::Pg => "pg",
            ManagedDatabaseServiceType::Redis => "redis",
            ManagedDatabaseServiceType::OpenSearch => "opensearch",
            ManagedDatabaseServiceType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ManagedDatabaseServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const MANAGED_DATABASE_STATE_RUNNING: &str = "running";

/// User type of the service's built-in administrator
pub const MANAGED_DATABASE_USER_TYPE_PRIMARY: &str = "primary";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagedDatabase {
    pub uuid: String,
    pub name: String,
    pub title: String,
    #[serde(rename = "type")]
    pub service_type: ManagedDatabaseServiceType,
    pub state: String,
    pub powered: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PgAccessControl {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_replication: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisAccessControl {
    pub categories: Vec<String>,
    pub channels: Vec<String>,
    pub commands: Vec<String>,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSearchAccessControlRule {
    pub index: String,
    pub permission: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenSearchAccessControl {
    pub rules: Vec<OpenSearchAccessControlRule>,
}

/// Access-control payload; serialized as a single `<variant>_access_control` key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ManagedDatabaseUserAccessControl {
    #[serde(rename = "pg_access_control")]
    Pg(PgAccessControl),
    #[serde(rename = "redis_access_control")]
    Redis(RedisAccessControl),
    #[serde(rename = "opensearch_access_control")]
    OpenSearch(OpenSearchAccessControl),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagedDatabaseUser {
    pub username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub authentication: String,
    #[serde(rename = "type")]
    pub user_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pg_access_control: Option<PgAccessControl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis_access_control: Option<RedisAccessControl>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opensearch_access_control: Option<OpenSearchAccessControl>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CreateManagedDatabaseUserRequest {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub access_control: Option<ManagedDatabaseUserAccessControl>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ModifyManagedDatabaseUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
}

impl ModifyManagedDatabaseUserRequest {
    pub fn is_empty(&self) -> bool {
        self.password.is_none() && self.authentication.is_none()
    }
}

// =============================================================================
// Networks
// =============================================================================

/// The network API encodes booleans as "yes" / "no"
pub mod yes_no {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "yes" } else { "no" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Str(String),
            Bool(bool),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Bool(b) => Ok(b),
            Repr::Str(s) => match s.as_str() {
                "yes" | "true" => Ok(true),
                "no" | "false" | "" => Ok(false),
                other => Err(serde::de::Error::custom(format!(
                    "expected \"yes\" or \"no\", got \"{}\"",
                    other
                ))),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IpNetwork {
    pub address: String,
    #[serde(with = "yes_no", default)]
    pub dhcp: bool,
    #[serde(with = "yes_no", default)]
    pub dhcp_default_route: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dhcp_dns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dhcp_routes: Vec<String>,
    pub family: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gateway: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IpNetworks {
    #[serde(default)]
    pub ip_network: Vec<IpNetwork>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    pub uuid: String,
    pub name: String,
    pub zone: String,
    #[serde(rename = "type")]
    pub network_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router: Option<String>,
    pub ip_networks: IpNetworks,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CreateNetworkRequest {
    pub name: String,
    pub zone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router: Option<String>,
    pub ip_networks: IpNetworks,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ModifyNetworkRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_networks: Option<IpNetworks>,
}

impl ModifyNetworkRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.ip_networks.is_none()
    }
}

/// `{"network": ...}` body used by every network endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct NetworkEnvelope<T> {
    pub network: T,
}

// =============================================================================
// Load Balancer Frontend Rules
// =============================================================================

pub const ACTION_USE_BACKEND: &str = "use_backend";
pub const ACTION_HTTP_REDIRECT: &str = "http_redirect";
pub const ACTION_HTTP_RETURN: &str = "http_return";
pub const ACTION_TCP_REJECT: &str = "tcp_reject";
pub const ACTION_SET_FORWARDED_HEADERS: &str = "set_forwarded_headers";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionUseBackend {
    pub backend: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionHttpRedirect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionHttpReturn {
    pub status: i64,
    pub content_type: String,
    pub payload: String,
}

/// Payload of actions without parameters
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EmptyAction {}

/// Rule action; `action_type` selects which payload field is set
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoadBalancerAction {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_use_backend: Option<ActionUseBackend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_http_redirect: Option<ActionHttpRedirect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_http_return: Option<ActionHttpReturn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_tcp_reject: Option<EmptyAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_set_forwarded_headers: Option<EmptyAction>,
}

impl LoadBalancerAction {
    pub fn use_backend(backend: impl Into<String>) -> Self {
        Self {
            action_type: ACTION_USE_BACKEND.to_string(),
            action_use_backend: Some(ActionUseBackend {
                backend: backend.into(),
            }),
            ..Default::default()
        }
    }

    pub fn http_redirect(redirect: ActionHttpRedirect) -> Self {
        Self {
            action_type: ACTION_HTTP_REDIRECT.to_string(),
            action_http_redirect: Some(redirect),
            ..Default::default()
        }
    }

    pub fn http_return(ret: ActionHttpReturn) -> Self {
        Self {
            action_type: ACTION_HTTP_RETURN.to_string(),
            action_http_return: Some(ret),
            ..Default::default()
        }
    }

    pub fn tcp_reject() -> Self {
        Self {
            action_type: ACTION_TCP_REJECT.to_string(),
            action_tcp_reject: Some(EmptyAction {}),
            ..Default::default()
        }
    }

    pub fn set_forwarded_headers() -> Self {
        Self {
            action_type: ACTION_SET_FORWARDED_HEADERS.to_string(),
            action_set_forwarded_headers: Some(EmptyAction {}),
            ..Default::default()
        }
    }
}

pub const MATCHER_SRC_IP: &str = "src_ip";
pub const MATCHER_SRC_PORT: &str = "src_port";
pub const MATCHER_HOST: &str = "host";
pub const MATCHER_HTTP_METHOD: &str = "http_method";
pub const MATCHER_PATH: &str = "path";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchString {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_case: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchInteger {
    pub method: String,
    pub value: i64,
}

/// Rule matcher; `matcher_type` selects which `match_*` field is set
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoadBalancerMatcher {
    #[serde(rename = "type")]
    pub matcher_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_src_ip: Option<MatchString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_src_port: Option<MatchInteger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_host: Option<MatchString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_http_method: Option<MatchString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_path: Option<MatchString>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoadBalancerFrontendRule {
    pub name: String,
    pub priority: i64,
    #[serde(default)]
    pub matchers: Vec<LoadBalancerMatcher>,
    #[serde(default)]
    pub actions: Vec<LoadBalancerAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ModifyLoadBalancerFrontendRuleRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
}
