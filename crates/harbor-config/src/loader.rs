use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::HarborConfig;

/// Loads the Harbor configuration from disk with env-var overrides.
pub struct ConfigLoader {
    config: HarborConfig,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > HARBOR_CONFIG env > ~/.harbor/harbor.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("HARBOR_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".harbor")
            .join("harbor.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> harbor_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            toml::from_str::<HarborConfig>(&raw).map_err(|e| {
                harbor_core::HarborError::Config(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            HarborConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        // Validate — log warnings, fail on errors
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(harbor_core::HarborError::Config(e));
            }
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// The loaded configuration.
    pub fn get(&self) -> HarborConfig {
        self.config.clone()
    }

    /// Path the config was loaded from (or would be).
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (HARBOR_LOG_LEVEL, HARBOR_DB_PATH, etc.)
    fn apply_env_overrides(mut config: HarborConfig) -> HarborConfig {
        if let Ok(v) = std::env::var("HARBOR_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("HARBOR_DB_PATH") {
            config.memory.db_path = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("HARBOR_RETENTION_DAYS") {
            if let Ok(days) = v.parse::<i64>() {
                config.memory.retention_max_age_days = days;
            }
        }
        // API key: env var fills in when the config file doesn't set it.
        if config.services.api_key.is_none() {
            if let Ok(v) = std::env::var("HARBOR_API_KEY") {
                config.services.api_key = Some(v);
            }
        }
        if config.services.base_url.is_none() {
            if let Ok(v) = std::env::var("HARBOR_BASE_URL") {
                config.services.base_url = Some(v);
            }
        }
        config
    }
}
