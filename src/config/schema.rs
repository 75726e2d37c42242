// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Configuration structures.
//!
//! This module defines the TOML schema of the renewal daemon.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::RenewError;
use crate::metadata::DEFAULT_METADATA_URL;
use crate::restart::SystemctlRestarter;
use crate::source::CertificateManagerConfig;
use crate::source::certificate_manager::{DEFAULT_API_URL, DEFAULT_DATA_URL};
use crate::types::CertificateJob;

/// Complete daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenewerConfig {
    /// Interval between renewal passes.
    #[serde(with = "crate::duration::serde")]
    pub renewal_period: Duration,

    /// Interval between heartbeat log lines. Defaults to a tenth of the
    /// renewal period.
    #[serde(
        default,
        with = "crate::duration::serde::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub heartbeat_period: Option<Duration>,

    /// Run a pass immediately at start-up.
    #[serde(default = "default_true")]
    pub run_on_start: bool,

    /// Folder to look certificates up in. Taken from instance metadata
    /// when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,

    /// Remote endpoints.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Service restart command.
    #[serde(default)]
    pub restart: RestartConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Certificates to keep current.
    #[serde(default)]
    pub certs: Vec<CertificateJob>,
}

impl RenewerConfig {
    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or missing required fields.
    pub fn from_toml(toml_str: &str) -> Result<Self, RenewError> {
        toml::from_str(toml_str).map_err(|e| RenewError::config(format!("Invalid TOML: {e}")))
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, RenewError> {
        toml::to_string_pretty(self)
            .map_err(|e| RenewError::config(format!("TOML serialize: {e}")))
    }

    /// Effective heartbeat interval.
    pub fn heartbeat_period(&self) -> Duration {
        self.heartbeat_period
            .unwrap_or(self.renewal_period / 10)
    }

    /// Validate the configuration for completeness and consistency.
    ///
    /// All problems are collected and reported together.
    ///
    /// # Errors
    ///
    /// Returns an error describing any validation failures.
    pub fn validate(&self) -> Result<(), RenewError> {
        let mut errors = Vec::new();

        if self.renewal_period.is_zero() {
            errors.push("renewal_period must be > 0".to_string());
        }
        if self.heartbeat_period.is_some_and(|d| d.is_zero()) {
            errors.push("heartbeat_period must be > 0 when set".to_string());
        }
        if self.folder_id.as_deref().is_some_and(|f| f.trim().is_empty()) {
            errors.push("folder_id must not be empty when set".to_string());
        }

        self.remote.validate(&mut errors);

        if self.restart.command.first().is_none_or(|p| p.is_empty()) {
            errors.push("restart.command must name a program".to_string());
        }

        if self.certs.is_empty() {
            errors.push("at least one [[certs]] entry is required".to_string());
        }
        validate_certs(&self.certs, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RenewError::config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn validate_certs(certs: &[CertificateJob], errors: &mut Vec<String>) {
    let mut seen: HashMap<&Path, String> = HashMap::new();

    for (index, cert) in certs.iter().enumerate() {
        let required = [
            ("name", cert.name.is_empty()),
            ("priv_key", cert.private_key_path.as_os_str().is_empty()),
            ("chain", cert.chain_path.as_os_str().is_empty()),
            ("service", cert.service_name.is_empty()),
        ];
        for (field, missing) in required {
            if missing {
                errors.push(format!("certs[{index}].{field} is required"));
            }
        }

        for (field, path) in [("chain", &cert.chain_path), ("priv_key", &cert.private_key_path)] {
            if path.as_os_str().is_empty() {
                continue;
            }
            let here = format!("certs[{index}].{field}");
            match seen.get(path.as_path()) {
                Some(owner) => errors.push(format!(
                    "{here} {} is already used by {owner}",
                    path.display()
                )),
                None => {
                    seen.insert(path.as_path(), here);
                }
            }
        }
    }
}

/// Remote endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    /// Certificate Manager API URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Certificate Manager data API URL.
    #[serde(default = "default_data_url")]
    pub data_url: String,

    /// Instance metadata service URL.
    #[serde(default = "default_metadata_url")]
    pub metadata_url: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout", with = "crate::duration::serde")]
    pub request_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            data_url: default_data_url(),
            metadata_url: default_metadata_url(),
            request_timeout: default_timeout(),
        }
    }
}

impl RemoteConfig {
    /// Build the Certificate Manager client configuration.
    pub fn certificate_manager(&self) -> Result<CertificateManagerConfig, RenewError> {
        CertificateManagerConfig::new(&self.api_url, &self.data_url, self.request_timeout)
    }

    fn validate(&self, errors: &mut Vec<String>) {
        for (field, value) in [
            ("api_url", &self.api_url),
            ("data_url", &self.data_url),
            ("metadata_url", &self.metadata_url),
        ] {
            if let Err(e) = Url::parse(value) {
                errors.push(format!("remote.{field} is not a valid URL ({e}): {value}"));
            }
        }
        if self.request_timeout.is_zero() {
            errors.push("remote.request_timeout must be > 0".to_string());
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_data_url() -> String {
    DEFAULT_DATA_URL.to_string()
}

fn default_metadata_url() -> String {
    DEFAULT_METADATA_URL.to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Service restart configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestartConfig {
    /// Program and leading arguments; the service name is appended.
    #[serde(default = "default_restart_command")]
    pub command: Vec<String>,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            command: default_restart_command(),
        }
    }
}

impl RestartConfig {
    /// Build the restarter for this command.
    pub fn restarter(&self) -> Result<SystemctlRestarter, RenewError> {
        SystemctlRestarter::from_command(&self.command)
    }
}

fn default_restart_command() -> Vec<String> {
    vec!["systemctl".to_string(), "restart".to_string()]
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything.
    Trace,
    /// Diagnostic detail.
    Debug,
    /// Normal operation.
    #[default]
    Info,
    /// Problems that do not stop a pass.
    Warn,
    /// Failures only.
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Emit JSON lines instead of text.
    #[serde(default)]
    pub json_format: bool,

    /// Append to this file instead of writing to stdout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}
