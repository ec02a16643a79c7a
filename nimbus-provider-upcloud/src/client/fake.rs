//! In-memory `UpcloudApi` used by handler tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::types::*;
use super::{ApiError, ApiResult, UpcloudApi};

#[derive(Default)]
pub struct FakeState {
    pub databases: HashMap<String, ManagedDatabase>,
    /// (service uuid, username) -> user
    pub users: HashMap<(String, String), ManagedDatabaseUser>,
    pub networks: HashMap<String, Network>,
    /// (load balancer uuid, frontend, rule name) -> rule
    pub rules: HashMap<(String, String, String), LoadBalancerFrontendRule>,
    /// Database states returned by successive polls before settling on the stored one
    pub pending_states: Vec<String>,
    /// Names of the calls made, in order
    pub calls: Vec<String>,
    pub last_user_request: Option<CreateManagedDatabaseUserRequest>,
    pub last_access_control: Option<ManagedDatabaseUserAccessControl>,
    pub next_network_id: u32,
}

#[derive(Default)]
pub struct FakeApi {
    pub state: Mutex<FakeState>,
}

fn not_found(what: &str) -> ApiError {
    ApiError::problem(404, "RESOURCE_NOT_FOUND", format!("{} not found", what))
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(self, uuid: &str, service_type: ManagedDatabaseServiceType, powered: bool) -> Self {
        let db = ManagedDatabase {
            uuid: uuid.to_string(),
            name: format!("db-{}", uuid),
            title: "database".to_string(),
            service_type,
            state: if powered { "running" } else { "poweroff" }.to_string(),
            powered,
        };
        self.lock().databases.insert(uuid.to_string(), db);
        self
    }

    pub fn with_user(self, service: &str, user: ManagedDatabaseUser) -> Self {
        self.lock()
            .users
            .insert((service.to_string(), user.username.clone()), user);
        self
    }

    pub fn with_network(self, network: Network) -> Self {
        self.lock().networks.insert(network.uuid.clone(), network);
        self
    }

    pub fn with_rule(self, lb: &str, frontend: &str, rule: LoadBalancerFrontendRule) -> Self {
        self.lock()
            .rules
            .insert((lb.to_string(), frontend.to_string(), rule.name.clone()), rule);
        self
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn record(&self, call: &str) -> std::sync::MutexGuard<'_, FakeState> {
        let mut state = self.lock();
        state.calls.push(call.to_string());
        state
    }
}

#[async_trait]
impl UpcloudApi for FakeApi {
    async fn get_managed_database(&self, uuid: &str) -> ApiResult<ManagedDatabase> {
        let mut state = self.record("get_managed_database");
        let mut db = state
            .databases
            .get(uuid)
            .cloned()
            .ok_or_else(|| not_found("database"))?;
        if !state.pending_states.is_empty() {
            db.state = state.pending_states.remove(0);
        }
        Ok(db)
    }

    async fn create_managed_database_user(
        &self,
        service_uuid: &str,
        request: &CreateManagedDatabaseUserRequest,
    ) -> ApiResult<ManagedDatabaseUser> {
        let mut state = self.record("create_managed_database_user");
        state.last_user_request = Some(request.clone());

        let mut user = ManagedDatabaseUser {
            username: request.username.clone(),
            password: request
                .password
                .clone()
                .unwrap_or_else(|| "generated-password".to_string()),
            authentication: request.authentication.clone().unwrap_or_default(),
            user_type: "normal".to_string(),
            ..Default::default()
        };
        match &request.access_control {
            Some(ManagedDatabaseUserAccessControl::Pg(pg)) => {
                user.pg_access_control = Some(pg.clone())
            }
            Some(ManagedDatabaseUserAccessControl::Redis(redis)) => {
                user.redis_access_control = Some(redis.clone())
            }
            Some(ManagedDatabaseUserAccessControl::OpenSearch(os)) => {
                user.opensearch_access_control = Some(os.clone())
            }
            None => {}
        }
        state
            .users
            .insert((service_uuid.to_string(), user.username.clone()), user.clone());
        Ok(user)
    }

    async fn get_managed_database_user(
        &self,
        service_uuid: &str,
        username: &str,
    ) -> ApiResult<ManagedDatabaseUser> {
        let state = self.record("get_managed_database_user");
        state
            .users
            .get(&(service_uuid.to_string(), username.to_string()))
            .cloned()
            .ok_or_else(|| not_found("user"))
    }

    async fn modify_managed_database_user(
        &self,
        service_uuid: &str,
        username: &str,
        request: &ModifyManagedDatabaseUserRequest,
    ) -> ApiResult<ManagedDatabaseUser> {
        let mut state = self.record("modify_managed_database_user");
        let user = state
            .users
            .get_mut(&(service_uuid.to_string(), username.to_string()))
            .ok_or_else(|| not_found("user"))?;
        if let Some(password) = &request.password {
            user.password = password.clone();
        }
        if let Some(authentication) = &request.authentication {
            user.authentication = authentication.clone();
        }
        Ok(user.clone())
    }

    async fn modify_managed_database_user_access_control(
        &self,
        service_uuid: &str,
        username: &str,
        access_control: &ManagedDatabaseUserAccessControl,
    ) -> ApiResult<()> {
        let mut state = self.record("modify_managed_database_user_access_control");
        state.last_access_control = Some(access_control.clone());
        let user = state
            .users
            .get_mut(&(service_uuid.to_string(), username.to_string()))
            .ok_or_else(|| not_found("user"))?;
        match access_control {
            ManagedDatabaseUserAccessControl::Pg(pg) => user.pg_access_control = Some(pg.clone()),
            ManagedDatabaseUserAccessControl::Redis(redis) => {
                user.redis_access_control = Some(redis.clone())
            }
            ManagedDatabaseUserAccessControl::OpenSearch(os) => {
                user.opensearch_access_control = Some(os.clone())
            }
        }
        Ok(())
    }

    async fn delete_managed_database_user(
        &self,
        service_uuid: &str,
        username: &str,
    ) -> ApiResult<()> {
        let mut state = self.record("delete_managed_database_user");
        state
            .users
            .remove(&(service_uuid.to_string(), username.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found("user"))
    }

    async fn create_network(&self, request: &CreateNetworkRequest) -> ApiResult<Network> {
        let mut state = self.record("create_network");
        state.next_network_id += 1;
        let uuid = format!("03{:06x}", state.next_network_id);

        let mut ip_networks = request.ip_networks.clone();
        for ipn in &mut ip_networks.ip_network {
            if ipn.gateway.is_empty() && ipn.family == "IPv4" {
                ipn.gateway = "10.0.0.1".to_string();
            }
        }

        let network = Network {
            uuid: uuid.clone(),
            name: request.name.clone(),
            zone: request.zone.clone(),
            network_type: "private".to_string(),
            router: request.router.clone(),
            ip_networks,
        };
        state.networks.insert(uuid, network.clone());
        Ok(network)
    }

    async fn get_network_details(&self, uuid: &str) -> ApiResult<Network> {
        let state = self.record("get_network_details");
        state
            .networks
            .get(uuid)
            .cloned()
            .ok_or_else(|| not_found("network"))
    }

    async fn modify_network(
        &self,
        uuid: &str,
        request: &ModifyNetworkRequest,
    ) -> ApiResult<Network> {
        let mut state = self.record("modify_network");
        let network = state
            .networks
            .get_mut(uuid)
            .ok_or_else(|| not_found("network"))?;
        if let Some(name) = &request.name {
            network.name = name.clone();
        }
        if let Some(ip_networks) = &request.ip_networks {
            network.ip_networks = ip_networks.clone();
        }
        Ok(network.clone())
    }

    async fn delete_network(&self, uuid: &str) -> ApiResult<()> {
        let mut state = self.record("delete_network");
        state
            .networks
            .remove(uuid)
            .map(|_| ())
            .ok_or_else(|| not_found("network"))
    }

    async fn attach_network_router(&self, network_uuid: &str, router_uuid: &str) -> ApiResult<()> {
        let mut state = self.record("attach_network_router");
        let network = state
            .networks
            .get_mut(network_uuid)
            .ok_or_else(|| not_found("network"))?;
        network.router = Some(router_uuid.to_string());
        Ok(())
    }

    async fn detach_network_router(&self, network_uuid: &str) -> ApiResult<()> {
        let mut state = self.record("detach_network_router");
        let network = state
            .networks
            .get_mut(network_uuid)
            .ok_or_else(|| not_found("network"))?;
        network.router = None;
        Ok(())
    }

    async fn create_load_balancer_frontend_rule(
        &self,
        load_balancer_uuid: &str,
        frontend: &str,
        rule: &LoadBalancerFrontendRule,
    ) -> ApiResult<LoadBalancerFrontendRule> {
        let mut state = self.record("create_load_balancer_frontend_rule");
        state.rules.insert(
            (
                load_balancer_uuid.to_string(),
                frontend.to_string(),
                rule.name.clone(),
            ),
            rule.clone(),
        );
        Ok(rule.clone())
    }

    async fn get_load_balancer_frontend_rule(
        &self,
        load_balancer_uuid: &str,
        frontend: &str,
        name: &str,
    ) -> ApiResult<LoadBalancerFrontendRule> {
        let state = self.record("get_load_balancer_frontend_rule");
        state
            .rules
            .get(&(
                load_balancer_uuid.to_string(),
                frontend.to_string(),
                name.to_string(),
            ))
            .cloned()
            .ok_or_else(|| not_found("rule"))
    }

    async fn modify_load_balancer_frontend_rule(
        &self,
        load_balancer_uuid: &str,
        frontend: &str,
        name: &str,
        request: &ModifyLoadBalancerFrontendRuleRequest,
    ) -> ApiResult<LoadBalancerFrontendRule> {
        let mut state = self.record("modify_load_balancer_frontend_rule");
        let key = (
            load_balancer_uuid.to_string(),
            frontend.to_string(),
            name.to_string(),
        );
        let mut rule = state.rules.remove(&key).ok_or_else(|| not_found("rule"))?;
        if let Some(name) = &request.name {
            rule.name = name.clone();
        }
        if let Some(priority) = request.priority {
            rule.priority = priority;
        }
        state.rules.insert(
            (
                load_balancer_uuid.to_string(),
                frontend.to_string(),
                rule.name.clone(),
            ),
            rule.clone(),
        );
        Ok(rule)
    }

    async fn delete_load_balancer_frontend_rule(
        &self,
        load_balancer_uuid: &str,
        frontend: &str,
        name: &str,
    ) -> ApiResult<()> {
        let mut state = self.record("delete_load_balancer_frontend_rule");
        state
            .rules
            .remove(&(
                load_balancer_uuid.to_string(),
                frontend.to_string(),
                name.to_string(),
            ))
            .map(|_| ())
            .ok_or_else(|| not_found("rule"))
    }
}
