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

//! # certrenewer
//!
//! Keeps TLS certificates deployed on a host in sync with a cloud
//! certificate manager.
//!
//! For each configured certificate the local chain file is inspected, the
//! remote certificate of the same name is looked up, and when the remote
//! one is newer its chain and private key are installed over the local
//! files (keeping a `.bak` copy). Afterwards every service that uses one of
//! the certificates is restarted once.
//!
//! ## Features
//!
//! - **Async-first design** using Tokio
//! - **Failure isolation**: one broken certificate never blocks the others
//! - **Capability traits** for the remote source, service restarts and
//!   expiry inspection, so every external effect can be substituted
//! - **Cancellation** of in-flight remote calls and restarts
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use certrenewer::{
//!     CertificateJob, CertificateManagerClient, CertificateManagerConfig,
//!     InstanceMetadataClient, RenewalOrchestrator, SystemctlRestarter,
//! };
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cancel = CancellationToken::new();
//!     let metadata = InstanceMetadataClient::new(
//!         certrenewer::metadata::DEFAULT_METADATA_URL,
//!         Duration::from_secs(10),
//!     )?;
//!     let folder = metadata.identity(&cancel).await?.vendor.folder_id;
//!
//!     let source = CertificateManagerClient::new(
//!         CertificateManagerConfig::default(),
//!         Arc::new(metadata),
//!     )?;
//!     let orchestrator = RenewalOrchestrator::new(
//!         folder,
//!         Arc::new(source),
//!         Arc::new(SystemctlRestarter::default()),
//!     );
//!
//!     let jobs = [CertificateJob::new(
//!         "web",
//!         "/etc/ssl/private/web.key",
//!         "/etc/ssl/certs/web.pem",
//!         "nginx",
//!     )];
//!     let report = orchestrator.run(&jobs, &cancel).await;
//!     println!("installed {}", report.installed());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod duration;
pub mod error;
pub mod expiry;
pub mod logging;
pub mod metadata;
pub mod renewal;
pub mod replace;
pub mod restart;
pub mod scheduler;
pub mod source;
pub mod types;
pub mod util;

// Re-export main types at crate root for convenience
pub use config::{ConfigLoader, RenewerConfig};
pub use error::{RenewError, Result, Stage};
pub use expiry::{ExpiryInspector, PemChainInspector};
pub use metadata::{InstanceMetadataClient, StaticToken, TokenProvider};
pub use renewal::{JobOutcome, RenewalOrchestrator, RenewalReport};
pub use restart::{ServiceRestarter, SystemctlRestarter};
pub use scheduler::{RenewalScheduler, ScheduleConfig};
pub use source::{CertificateManagerClient, CertificateManagerConfig, RemoteCertificateSource};
pub use types::{
    CertificateJob, CertificateStatus, RemoteCertificateContent, RemoteCertificateDescriptor,
    RenewalAggregate,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent string for HTTP requests.
pub const USER_AGENT: &str = concat!("certrenewer/", env!("CARGO_PKG_VERSION"));
