use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use directories::BaseDirs;

use crate::error::{ChatError, ChatResult};

fn default_send_timeout() -> u64 {
    15
}

fn default_cache() -> bool {
    true
}

/// Client profile: where the backend lives and who we are on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppState {
    pub base_url: String,
    pub token: Option<String>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
    #[serde(default = "default_cache")]
    pub cache: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            user_id: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            send_timeout_secs: default_send_timeout(),
            cache: default_cache(),
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toml_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("matchchat").join("client.toml"))
    }

    /// Loads the profile from the default location, falling back to an empty one.
    pub fn load() -> Self {
        if let Some(path) = Self::toml_path() {
            match Self::load_from(&path) {
                Ok(state) => return state,
                Err(e) => log::debug!("no usable profile at {}: {}", path.display(), e),
            }
        }
        Self::new()
    }

    pub fn load_from(path: &Path) -> ChatResult<Self> {
        let text = fs::read_to_string(path)?;
        toml::from_str::<AppState>(&text).map_err(|e| ChatError::Config(e.to_string()))
    }

    pub fn save(&self) -> ChatResult<()> {
        let path = Self::toml_path()
            .ok_or_else(|| ChatError::Config("no config dir".into()))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> ChatResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self).map_err(|e| ChatError::Config(e.to_string()))?;
        fs::write(path, toml)?;
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.user_id.is_empty() && self.token.is_some()
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_round_trips_through_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("client.toml");
        let state = AppState {
            base_url: "http://localhost:8080".into(),
            token: Some("tok-a".into()),
            user_id: "a".into(),
            first_name: "Aisha".into(),
            last_name: "Khan".into(),
            send_timeout_secs: 5,
            cache: false,
        };
        state.save_to(&path).unwrap();
        let loaded = AppState::load_from(&path).unwrap();
        assert_eq!(loaded.user_id, "a");
        assert_eq!(loaded.send_timeout(), Duration::from_secs(5));
        assert!(loaded.is_configured());
        assert!(!loaded.cache);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let state: AppState = toml::from_str("base_url = \"http://x\"").unwrap();
        assert_eq!(state.send_timeout_secs, 15);
        assert!(state.cache);
        assert!(!state.is_configured());
    }
}
