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

//! Renewal data types.
//!
//! This module provides the job descriptors handed to the orchestrator, the
//! transient remote certificate types and the per-batch aggregate.

mod remote;

pub use remote::{CertificateStatus, RemoteCertificateContent, RemoteCertificateDescriptor};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One certificate the host must keep current.
///
/// All four fields are required to be non-empty; the configuration layer
/// enforces this before jobs reach the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateJob {
    /// Certificate name, unique within the remote folder.
    pub name: String,

    /// Path of the PEM private key file.
    #[serde(rename = "priv_key")]
    pub private_key_path: PathBuf,

    /// Path of the PEM certificate chain file.
    #[serde(rename = "chain")]
    pub chain_path: PathBuf,

    /// Host service restarted after renewal.
    #[serde(rename = "service")]
    pub service_name: String,
}

impl CertificateJob {
    /// Create a new job descriptor.
    pub fn new(
        name: impl Into<String>,
        private_key_path: impl Into<PathBuf>,
        chain_path: impl Into<PathBuf>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            private_key_path: private_key_path.into(),
            chain_path: chain_path.into(),
            service_name: service_name.into(),
        }
    }
}

/// Summary of one orchestration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenewalAggregate {
    /// Number of jobs in the batch.
    pub total: usize,

    /// Number of jobs whose service restarted successfully.
    ///
    /// This is gated on the service restart only: every job mapped to a
    /// service that restarted cleanly is counted, whether or not its own
    /// certificate was installed.
    pub success: usize,
}

/// Mapping from service name to the number of jobs naming it.
///
/// Built once per batch, before any job task starts, and read-only after.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceGroup {
    counts: BTreeMap<String, usize>,
}

impl ServiceGroup {
    /// Build the grouping for a batch.
    pub fn from_jobs(jobs: &[CertificateJob]) -> Self {
        let mut counts = BTreeMap::new();
        for job in jobs {
            *counts.entry(job.service_name.clone()).or_insert(0) += 1;
        }
        Self { counts }
    }

    /// Number of jobs naming `service`.
    pub fn count(&self, service: &str) -> usize {
        self.counts.get(service).copied().unwrap_or(0)
    }

    /// Number of distinct services.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns true if no service is named.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate over `(service, job count)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(name, count)| (name.as_str(), *count))
    }
}
