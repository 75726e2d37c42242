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

//! Daemon configuration.
//!
//! # Example Configuration
//!
//! ```toml
//! renewal_period = "1d"
//! folder_id = "b1gfolder"
//!
//! [logging]
//! level = "info"
//!
//! [[certs]]
//! name = "web"
//! priv_key = "/etc/ssl/private/web.key"
//! chain = "/etc/ssl/certs/web.pem"
//! service = "nginx"
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use certrenewer::config::ConfigLoader;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration from default locations
//! let config = ConfigLoader::new().load()?;
//!
//! // Or load from a specific path
//! let config = ConfigLoader::new()
//!     .with_path("/path/to/config.toml")
//!     .load()?;
//!
//! println!("{} certificates", config.certs.len());
//! # Ok(())
//! # }
//! ```

mod loader;
mod schema;

pub use loader::{CONFIG_ENV_VAR, ConfigLoader, DEFAULT_CONFIG, write_default_config};
pub use schema::*;
