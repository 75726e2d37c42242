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

//! Remote certificate source and the renewal decision.
//!
//! The orchestrator only talks to a [`RemoteCertificateSource`]. The
//! concrete cloud adapter lives in [`certificate_manager`]; tests substitute
//! their own implementation.
//!
//! # Decision
//!
//! Given the remote descriptor and the local due date:
//!
//! 1. no descriptor: [`RenewError::CertificateNotFound`]
//! 2. status other than issued: [`RenewError::AbnormalStatus`]
//! 3. `not_after <= due`: nothing to do
//! 4. otherwise: fetch and install
//!
//! Equal timestamps mean the same issuance is already installed.

pub mod certificate_manager;

pub use certificate_manager::{CertificateManagerClient, CertificateManagerConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{RenewError, Result};
use crate::types::{RemoteCertificateContent, RemoteCertificateDescriptor};

/// Capability for looking up and fetching issued certificates.
///
/// Both operations accept a cancellation token so the caller can bound a
/// stuck network call; implementations return [`RenewError::Cancelled`]
/// once it fires.
#[async_trait]
pub trait RemoteCertificateSource: Send + Sync {
    /// Find a certificate by name within a folder.
    ///
    /// Returns `Ok(None)` when no certificate with that name exists, and
    /// [`RenewError::Lookup`] on transport failure.
    async fn find_by_name(
        &self,
        folder_id: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<RemoteCertificateDescriptor>>;

    /// Fetch chain and PKCS#8 private key of a certificate.
    ///
    /// Fails with [`RenewError::Content`] if retrieval fails.
    async fn fetch_content(
        &self,
        certificate_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RemoteCertificateContent>;
}

/// Outcome of the renewal decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalDecision {
    /// The remote certificate is not newer than the installed one.
    UpToDate,
    /// A newer certificate exists and should be installed.
    Renew {
        /// Remote identifier to fetch content for.
        certificate_id: String,
    },
}

impl RenewalDecision {
    /// Returns true if an update is needed.
    pub fn needs_update(&self) -> bool {
        matches!(self, Self::Renew { .. })
    }
}

/// Decide whether the remote certificate should replace the local one.
pub fn decide(
    name: &str,
    folder_id: &str,
    descriptor: Option<&RemoteCertificateDescriptor>,
    due_date: DateTime<Utc>,
) -> Result<RenewalDecision> {
    let descriptor =
        descriptor.ok_or_else(|| RenewError::certificate_not_found(name, folder_id))?;

    if !descriptor.status.is_issued() {
        return Err(RenewError::abnormal_status(name, descriptor.status.clone()));
    }

    if descriptor.not_after <= due_date {
        return Ok(RenewalDecision::UpToDate);
    }

    Ok(RenewalDecision::Renew {
        certificate_id: descriptor.id.clone(),
    })
}

/// Look up `name`, decide, and fetch content when an update is needed.
///
/// Returns `Ok(None)` when the installed certificate is current.
pub async fn check_certificate(
    source: &dyn RemoteCertificateSource,
    folder_id: &str,
    name: &str,
    due_date: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<Option<RemoteCertificateContent>> {
    let descriptor = source.find_by_name(folder_id, name, cancel).await?;

    match decide(name, folder_id, descriptor.as_ref(), due_date)? {
        RenewalDecision::UpToDate => Ok(None),
        RenewalDecision::Renew { certificate_id } => {
            debug!(cert = name, id = %certificate_id, "fetching certificate content");
            let content = source.fetch_content(&certificate_id, cancel).await?;
            Ok(Some(content))
        }
    }
}
