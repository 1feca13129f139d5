use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::server::error::ServerError;

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// A directory entry with the bearer token that authenticates it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEntry {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// SQLite file; in-memory when absent.
    #[serde(default)]
    pub database: Option<PathBuf>,
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind(), database: None, users: Vec::new() }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let text = fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&text).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        let mut tokens = std::collections::HashSet::new();
        for u in &self.users {
            if u.id.trim().is_empty() || u.token.trim().is_empty() {
                return Err(ServerError::Config("users need a non-empty id and token".into()));
            }
            if !tokens.insert(u.token.as_str()) {
                return Err(ServerError::Config(format!("token of {} is shared with another user", u.id)));
            }
        }
        Ok(())
    }
}
