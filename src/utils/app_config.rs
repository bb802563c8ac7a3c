/// Application configuration management
/// Stores settings in ~/.config/modvault/config.toml, overridable from the environment

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{Grants, Permission, StaticUsers};
use crate::utils::constants::{ENV_DATABASE, ENV_STORAGE, ENV_USER_ID, ENV_WEB_TOKEN};
use crate::utils::helpers::{is_dir_writable, mask_sensitive};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite file holding the ledger
    pub database_path: PathBuf,
    /// Root of private file storage; archives land under `<root>/private/`
    pub storage_root: PathBuf,
    /// User recorded as owner when a backup does not name one
    pub acting_user_id: i64,
    /// User id → display name
    pub users: BTreeMap<String, String>,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors: bool,
    pub tokens: Vec<ApiToken>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiToken {
    pub token: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Shown in place of the secret by `config view`
    #[serde(default)]
    pub label: Option<String>,
}

impl ApiToken {
    /// The label when set, otherwise the masked token
    pub fn display_name(&self) -> String {
        match self.label.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => mask_sensitive(&self.token, 4),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("modvault")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: data_dir().join("ledger.db"),
            storage_root: data_dir().join("files"),
            acting_user_id: 1,
            users: BTreeMap::new(),
            server: ServerConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            cors: false,
            tokens: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine the user config directory")?
            .join("modvault");
        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from `path` (or the default location), then apply
    /// environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let mut config = Self::load_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read a config file; a missing file yields defaults
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Apply `MODVAULT_*` overrides from `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DATABASE).filter(|v| !v.is_empty()) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(root) = lookup(ENV_STORAGE).filter(|v| !v.is_empty()) {
            self.storage_root = PathBuf::from(root);
        }
        if let Some(user_id) = lookup(ENV_USER_ID).and_then(|v| v.trim().parse().ok()) {
            self.acting_user_id = user_id;
        }
        if let Some(token) = lookup(ENV_WEB_TOKEN).filter(|v| !v.is_empty()) {
            self.server.tokens.push(ApiToken {
                token,
                permissions: Permission::ALL.iter().map(|p| p.as_str().to_string()).collect(),
                label: Some(ENV_WEB_TOKEN.to_string()),
            });
        }
    }

    /// Problems that would stop the ledger from working
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.database_path.as_os_str().is_empty() {
            errors.push("database_path is empty".to_string());
        }

        if self.storage_root.as_os_str().is_empty() {
            errors.push("storage_root is empty".to_string());
        } else if self.storage_root.exists() && !is_dir_writable(&self.storage_root) {
            errors.push(format!(
                "storage_root {} is not a writable directory",
                self.storage_root.display()
            ));
        }

        if self.acting_user_id <= 0 {
            errors.push(format!("acting_user_id must be positive, got {}", self.acting_user_id));
        }

        for key in self.users.keys() {
            if key.parse::<i64>().is_err() {
                errors.push(format!("users: key {:?} is not a numeric user id", key));
            }
        }

        if self.server.port == 0 {
            errors.push("server.port must not be 0".to_string());
        }

        for (i, token) in self.server.tokens.iter().enumerate() {
            if token.token.trim().is_empty() {
                errors.push(format!("server.tokens[{}]: token is empty", i));
            }
            for name in &token.permissions {
                if Permission::parse(name).is_none() {
                    errors.push(format!("server.tokens[{}]: unknown permission {:?}", i, name));
                }
            }
        }

        errors
    }

    /// User directory backed by the `[users]` table
    pub fn user_directory(&self) -> StaticUsers {
        let names: HashMap<i64, String> = self
            .users
            .iter()
            .filter_map(|(id, name)| id.parse().ok().map(|id| (id, name.clone())))
            .collect();
        StaticUsers::new(self.acting_user_id, names)
    }

    /// Bearer token → grants
    pub fn token_grants(&self) -> HashMap<String, Grants> {
        self.server
            .tokens
            .iter()
            .map(|t| (t.token.clone(), Grants::from_names(&t.permissions)))
            .collect()
    }
}
