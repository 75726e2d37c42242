// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Logging setup.
//!
//! All components log through `tracing` with structured fields (`cert`,
//! `service`, `path`, `progress`, `stage`, `error`). This module installs
//! the subscriber that renders them:
//!
//! - level from the configuration, overridden by `RUST_LOG` when set
//! - human-readable text or JSON lines
//! - stdout, or a log file opened in append mode
//!
//! ```toml
//! [logging]
//! level = "info"
//! json_format = true
//! path = "/var/log/certrenewer.log"
//! ```

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::config::{LogLevel, LoggingConfig};
use crate::error::{RenewError, Result};

/// Build the level filter: `RUST_LOG` if set and valid, else `level`.
pub fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Build a subscriber for `config` without installing it.
pub fn subscriber(config: &LoggingConfig) -> Result<Box<dyn Subscriber + Send + Sync>> {
    let writer = match &config.path {
        Some(path) => BoxMakeWriter::new(Mutex::new(open_log_file(path)?)),
        None => BoxMakeWriter::new(std::io::stdout),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config.level))
        .with_writer(writer)
        .with_target(false);

    let subscriber: Box<dyn Subscriber + Send + Sync> = if config.json_format {
        Box::new(builder.json().finish())
    } else {
        Box::new(builder.with_ansi(config.path.is_none()).finish())
    };
    Ok(subscriber)
}

/// Install the global subscriber for `config`.
///
/// Fails if a global subscriber is already set.
pub fn init(config: &LoggingConfig) -> Result<()> {
    tracing::subscriber::set_global_default(subscriber(config)?)
        .map_err(|e| RenewError::config(format!("could not install logger: {e}")))
}

/// Open `path` for appending, creating it and its directory as needed.
fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            RenewError::config(format!("could not create log directory {}: {e}", parent.display()))
        })?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| RenewError::config(format!("could not open log file {}: {e}", path.display())))
}
