//! Role catalog: which handler each role builds, and what it needs
//!
//! Every role declares its dependency set up front through [`RoleFactory`].
//! The orchestrator injects the resource pool only into `NeedsPool` roles.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use troupe_pool::ResourcePool;

use crate::agents::{EchoHandler, LlmHandler};
use crate::descriptor::AgentConfig;
use crate::handler::AgentHandler;

/// Constructor for a role without external dependencies
pub type PlainConstructor = Arc<dyn Fn(&AgentConfig) -> Box<dyn AgentHandler> + Send + Sync>;

/// Constructor for a role that talks to pooled model clients
pub type PooledConstructor =
    Arc<dyn Fn(&AgentConfig, Arc<ResourcePool>) -> Box<dyn AgentHandler> + Send + Sync>;

/// Typed constructor for one role
#[derive(Clone)]
pub enum RoleFactory {
    Plain(PlainConstructor),
    NeedsPool(PooledConstructor),
}

impl RoleFactory {
    pub fn plain<F>(constructor: F) -> Self
    where
        F: Fn(&AgentConfig) -> Box<dyn AgentHandler> + Send + Sync + 'static,
    {
        RoleFactory::Plain(Arc::new(constructor))
    }

    pub fn needs_pool<F>(constructor: F) -> Self
    where
        F: Fn(&AgentConfig, Arc<ResourcePool>) -> Box<dyn AgentHandler> + Send + Sync + 'static,
    {
        RoleFactory::NeedsPool(Arc::new(constructor))
    }

    pub fn requires_pool(&self) -> bool {
        matches!(self, RoleFactory::NeedsPool(_))
    }

    /// Build a handler, injecting `pool` only when the role declared it
    pub fn construct(&self, config: &AgentConfig, pool: &Arc<ResourcePool>) -> Box<dyn AgentHandler> {
        match self {
            RoleFactory::Plain(build) => build(config),
            RoleFactory::NeedsPool(build) => build(config, Arc::clone(pool)),
        }
    }
}

impl fmt::Debug for RoleFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleFactory::Plain(_) => f.write_str("RoleFactory::Plain"),
            RoleFactory::NeedsPool(_) => f.write_str("RoleFactory::NeedsPool"),
        }
    }
}

/// Fixed mapping from role name to constructor
#[derive(Debug, Clone, Default)]
pub struct RoleCatalog {
    roles: HashMap<String, RoleFactory>,
}

impl RoleCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the `echo` and `llm` roles
    pub fn builtin() -> Self {
        Self::new()
            .with_role(
                "echo",
                RoleFactory::plain(|config| Box::new(EchoHandler::from_config(config))),
            )
            .with_role(
                "llm",
                RoleFactory::needs_pool(|config, pool| {
                    Box::new(LlmHandler::from_config(config, pool))
                }),
            )
    }

    pub fn with_role(mut self, role: impl Into<String>, factory: RoleFactory) -> Self {
        self.register(role, factory);
        self
    }

    /// Add or replace a role
    pub fn register(&mut self, role: impl Into<String>, factory: RoleFactory) {
        self.roles.insert(role.into(), factory);
    }

    pub fn get(&self, role: &str) -> Option<&RoleFactory> {
        self.roles.get(role)
    }

    pub fn contains(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    /// Known role names, sorted
    pub fn roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self.roles.keys().map(String::as_str).collect();
        roles.sort_unstable();
        roles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_roles_declare_dependencies() {
        let catalog = RoleCatalog::builtin();
        assert_eq!(catalog.roles(), vec!["echo", "llm"]);
        assert!(!catalog.get("echo").unwrap().requires_pool());
        assert!(catalog.get("llm").unwrap().requires_pool());
        assert!(catalog.get("researcher").is_none());
    }

    #[test]
    fn test_register_replaces_role() {
        let mut catalog = RoleCatalog::builtin();
        catalog.register(
            "echo",
            RoleFactory::needs_pool(|config, pool| Box::new(LlmHandler::from_config(config, pool))),
        );
        assert!(catalog.get("echo").unwrap().requires_pool());
    }
}
