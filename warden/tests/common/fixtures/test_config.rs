//! Test configuration builder writing a config directory to a temp dir

use std::fs;
use tempfile::TempDir;

pub const MINIMAL_MAIN: &str = r#"
[console]
host = "127.0.0.1"
"#;

/// Builder for a `main.toml` + optional `secrets.toml` directory
pub struct TestConfigBuilder {
    temp_dir: TempDir,
    main: String,
    secrets: Option<String>,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
            main: MINIMAL_MAIN.to_string(),
            secrets: None,
        }
    }

    pub fn with_main(mut self, toml: &str) -> Self {
        self.main = toml.to_string();
        self
    }

    pub fn with_console_password(mut self, password: &str) -> Self {
        self.secrets = Some(format!("[console]\npassword = \"{}\"\n", password));
        self
    }

    pub fn with_secrets(mut self, toml: &str) -> Self {
        self.secrets = Some(toml.to_string());
        self
    }

    /// Write the files and return the directory, which lives as long as the
    /// returned `TempDir`.
    pub fn build(self) -> (TempDir, String) {
        let dir = self.temp_dir.path().to_path_buf();
        fs::write(dir.join("main.toml"), &self.main).expect("Failed to write main.toml");
        if let Some(secrets) = &self.secrets {
            fs::write(dir.join("secrets.toml"), secrets).expect("Failed to write secrets.toml");
        }
        let path = dir.to_string_lossy().into_owned();
        (self.temp_dir, path)
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
