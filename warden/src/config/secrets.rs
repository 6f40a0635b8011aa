// File: warden/src/config/secrets.rs
//! Secrets loader for the remote console password.
//!
//! Secrets are stored in a separate TOML file (config/secrets.toml) that should
//! be excluded from version control.
//!
//! Example secrets.toml:
//! ```toml
//! [console]
//! password = "change-me"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Deserialize, Default)]
pub struct SecretsFile {
    #[serde(default)]
    pub console: ConsoleSecrets,
}

#[derive(Debug, Deserialize, Default)]
pub struct ConsoleSecrets {
    pub password: Option<String>,
}

/// Loader for secrets from the secrets.toml file
pub struct SecretsLoader {
    secrets: SecretsFile,
}

impl SecretsLoader {
    /// Load secrets from the specified file path.
    /// Returns an empty loader if the file doesn't exist.
    pub fn load(secrets_path: &Path) -> Result<Self> {
        if !secrets_path.exists() {
            warn!(
                "Secrets file not found at {:?}, console password must come from the environment",
                secrets_path
            );
            return Ok(Self {
                secrets: SecretsFile::default(),
            });
        }

        let content = std::fs::read_to_string(secrets_path)
            .with_context(|| format!("Failed to read secrets file: {:?}", secrets_path))?;

        let secrets: SecretsFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse secrets file: {:?}", secrets_path))?;

        info!("Loaded secrets from {:?}", secrets_path);

        Ok(Self { secrets })
    }

    pub fn console_password(&self) -> Option<&str> {
        self.secrets
            .console
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
    }
}
