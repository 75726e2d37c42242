// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Configuration file discovery and loading.

use std::path::{Path, PathBuf};

use crate::error::RenewError;

use super::schema::RenewerConfig;

/// Environment variable overriding the configuration path.
pub const CONFIG_ENV_VAR: &str = "CERTRENEWER_CONFIG";

/// Configuration file loader with discovery and precedence rules.
///
/// # Search Order
///
/// Configuration files are searched in the following order (first found wins):
///
/// 1. Explicit path (if set via `with_path()`)
/// 2. Environment variable `CERTRENEWER_CONFIG`
/// 3. Unix: `/etc/certrenewer/config.toml`
/// 4. User config directory: `certrenewer/config.toml`
/// 5. Current directory: `./certrenewer.toml`
///
/// # Example
///
/// ```no_run
/// use certrenewer::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_path("/etc/certrenewer/config.toml")
///     .load()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    explicit_path: Option<PathBuf>,
    validate: bool,
    env_var_name: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader with default settings.
    pub fn new() -> Self {
        Self {
            explicit_path: None,
            validate: true,
            env_var_name: CONFIG_ENV_VAR.to_string(),
        }
    }

    /// Set an explicit configuration file path.
    ///
    /// When set, only this path will be checked (no discovery).
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.explicit_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enable or disable validation after loading.
    ///
    /// Default: `true`
    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Set the environment variable name for path override.
    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var_name = name.into();
        self
    }

    /// Load the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if no file is found, it cannot be read, the TOML is
    /// invalid, or validation fails (if enabled).
    pub fn load(&self) -> Result<RenewerConfig, RenewError> {
        let path = self.find_config_file()?;
        tracing::debug!(path = %path.display(), "loading configuration");

        let content = std::fs::read_to_string(&path)
            .map_err(|e| RenewError::config(format!("Failed to read {}: {e}", path.display())))?;

        self.load_from_str(&content)
    }

    /// Load configuration from a TOML string.
    pub fn load_from_str(&self, toml_content: &str) -> Result<RenewerConfig, RenewError> {
        let config = RenewerConfig::from_toml(toml_content)?;
        if self.validate {
            config.validate()?;
        }
        Ok(config)
    }

    /// Find the configuration file path.
    pub fn find_config_file(&self) -> Result<PathBuf, RenewError> {
        if let Some(ref path) = self.explicit_path {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(RenewError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        if let Ok(env_path) = std::env::var(&self.env_var_name) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok(path);
            }
            return Err(RenewError::config(format!(
                "Configuration file from {} not found: {}",
                self.env_var_name, env_path
            )));
        }

        let candidates = self.search_paths();
        if let Some(path) = candidates.iter().find(|p| p.exists()) {
            return Ok(path.clone());
        }

        Err(RenewError::config(format!(
            "No configuration file found. Searched:\n  - {}",
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("\n  - ")
        )))
    }

    /// Standard locations, in search order.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(unix)]
        paths.push(PathBuf::from("/etc/certrenewer/config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("certrenewer").join("config.toml"));
        }

        paths.push(PathBuf::from("certrenewer.toml"));
        paths
    }

    /// Check if a configuration file exists in any standard location.
    pub fn config_exists(&self) -> bool {
        self.find_config_file().is_ok()
    }
}

/// Commented configuration template.
pub const DEFAULT_CONFIG: &str = r#"# Certificate renewal daemon configuration

# How often to check for renewed certificates (d, h, m, s, ms, us, ns)
renewal_period = "1d"

# How often to log a heartbeat line (default: renewal_period / 10)
# heartbeat_period = "2h"

# Run a renewal pass immediately at start-up
run_on_start = true

# Folder holding the certificates; read from instance metadata when unset
# folder_id = "b1g..."

[remote]
api_url = "https://certificate-manager.api.cloud.yandex.net"
data_url = "https://data.certificate-manager.api.cloud.yandex.net"
metadata_url = "http://169.254.169.254"
request_timeout = "30s"

[restart]
# The service name is appended as the last argument
command = ["systemctl", "restart"]

[logging]
# trace, debug, info, warn or error; RUST_LOG overrides
level = "info"
json_format = false
# path = "/var/log/certrenewer.log"

# One entry per certificate. Chain and key files must already exist.
[[certs]]
name = "example-cert"
priv_key = "/etc/ssl/private/example.key"
chain = "/etc/ssl/certs/example.pem"
service = "nginx"
"#;

/// Write the configuration template to `path`, creating parent directories.
pub fn write_default_config(path: impl AsRef<Path>) -> Result<(), RenewError> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            RenewError::config(format!("Failed to create {}: {e}", parent.display()))
        })?;
    }

    std::fs::write(path, DEFAULT_CONFIG)
        .map_err(|e| RenewError::config(format!("Failed to write config file: {e}")))
}
