//! Registry of external target servers agents may declare

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An external tool server an agent is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetServer {
    pub name: String,
    pub endpoint: String,
}

impl TargetServer {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
        }
    }
}

/// Name to [`TargetServer`] lookup, fixed after construction
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    servers: HashMap<String, TargetServer>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the in-process `echo` target
    pub fn with_defaults() -> Self {
        Self::new().with_server(TargetServer::new("echo", "mock://echo"))
    }

    pub fn with_server(mut self, server: TargetServer) -> Self {
        self.servers.insert(server.name.clone(), server);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TargetServer> {
        self.servers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.servers.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.servers.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_include_echo() {
        let targets = TargetRegistry::with_defaults();
        assert_eq!(targets.get("echo").unwrap().endpoint, "mock://echo");
        assert!(!targets.contains("filesystem"));
    }
}
