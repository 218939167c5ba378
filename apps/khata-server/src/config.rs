//! Server configuration module.
//!
//! Configuration is loaded from environment variables with fallback to defaults.

use khata_core::ledger::ReversalPolicy;
use khata_db::{DbConfig, IN_MEMORY_PATH};
use std::env;
use std::net::SocketAddr;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to
    pub bind_addr: SocketAddr,

    /// SQLite file path, or `:memory:`
    pub db_path: String,

    /// Connection pool size for file databases
    pub db_max_connections: u32,

    /// How deleted payments come off invoices
    pub reversal_policy: ReversalPolicy,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = ServerConfig {
            bind_addr: lookup("KHATA_BIND_ADDR")
                .unwrap_or_else(|| "0.0.0.0:5000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("KHATA_BIND_ADDR".to_string()))?,

            db_path: lookup("KHATA_DB_PATH").unwrap_or_else(|| "./khata.db".to_string()),

            db_max_connections: lookup("KHATA_DB_MAX_CONNECTIONS")
                .unwrap_or_else(|| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("KHATA_DB_MAX_CONNECTIONS".to_string()))?,

            reversal_policy: lookup("KHATA_REVERSAL_POLICY")
                .unwrap_or_else(|| "exact".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("KHATA_REVERSAL_POLICY".to_string()))?,
        };

        if config.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("KHATA_DB_MAX_CONNECTIONS".to_string()));
        }

        Ok(config)
    }

    /// Database settings derived from this configuration.
    pub fn db_config(&self) -> DbConfig {
        let base = if self.db_path == IN_MEMORY_PATH {
            DbConfig::in_memory()
        } else {
            DbConfig::new(&self.db_path).max_connections(self.db_max_connections)
        };

        base.reversal_policy(self.reversal_policy)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_addr.port(), 5000);
        assert_eq!(config.db_path, "./khata.db");
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.reversal_policy, ReversalPolicy::Exact);
    }

    #[test]
    fn test_memory_path_selects_in_memory_store() {
        let config = load(&[
            ("KHATA_DB_PATH", ":memory:"),
            ("KHATA_DB_MAX_CONNECTIONS", "8"),
            ("KHATA_REVERSAL_POLICY", "newest_first"),
        ])
        .unwrap();

        let db = config.db_config();
        assert!(db.is_in_memory());
        assert_eq!(db.max_connections, 1);
        assert_eq!(db.reversal_policy, ReversalPolicy::NewestFirst);
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let err = load(&[("KHATA_REVERSAL_POLICY", "oldest")]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for KHATA_REVERSAL_POLICY");

        let err = load(&[("KHATA_BIND_ADDR", "localhost")]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for KHATA_BIND_ADDR");

        assert!(load(&[("KHATA_DB_MAX_CONNECTIONS", "0")]).is_err());
    }
}
