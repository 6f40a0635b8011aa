// File: warden/src/config/manager.rs
use super::{Config, SecretsLoader};
use crate::errors::{ConfigError, WardenError};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

/// Environment variable that overrides the console password from secrets.toml
pub const PASSWORD_ENV: &str = "WARDEN_RCON_PASSWORD";

pub struct ConfigManager {
    current_config: Arc<Config>,
}

impl ConfigManager {
    pub async fn new(config_dir: String) -> Result<Self, WardenError> {
        let config = Self::load_configuration(&config_dir).await?;
        Ok(Self {
            current_config: Arc::new(config),
        })
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    async fn load_configuration(config_dir: &str) -> Result<Config, WardenError> {
        let main_config_path = format!("{}/main.toml", config_dir);
        let main_config_content =
            fs::read_to_string(&main_config_path)
                .await
                .map_err(|e| ConfigError::LoadFailed {
                    path: main_config_path.clone(),
                    reason: e.to_string(),
                })?;

        let mut config = Self::parse(&main_config_content)?;

        let secrets_path = format!("{}/secrets.toml", config_dir);
        let secrets = SecretsLoader::load(Path::new(&secrets_path))?;
        if let Some(password) = secrets.console_password() {
            config.console.password = password.to_string();
        }

        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            info!("Using console password from {}", PASSWORD_ENV);
            config.console.password = password;
        }

        if config.console.password.is_empty() {
            warn!("No console password configured - authentication will most likely fail");
        }

        config.validate()?;

        info!(
            "Loaded configuration: console {}, log {}, {} configured schedules",
            config.console.address(),
            config.logs.live_path().display(),
            config.schedules.len()
        );

        Ok(config)
    }

    /// Parse a main.toml document without touching secrets or the environment.
    pub fn parse(content: &str) -> Result<Config, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError {
            reason: e.to_string(),
        })
    }
}
