// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Transient types describing a remote certificate.
//!
//! None of these are persisted. Content in particular exists only for the
//! duration of one install and must never reach a log line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a remote certificate.
///
/// Only [`CertificateStatus::Issued`] allows renewal to proceed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CertificateStatus {
    /// Certificate is issued and usable.
    Issued,
    /// Certificate was revoked.
    Revoked,
    /// Any other status (validating, renewing, invalid, ...).
    Other(String),
}

impl CertificateStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Issued => "ISSUED",
            Self::Revoked => "REVOKED",
            Self::Other(s) => s,
        }
    }

    /// Returns true if the certificate is issued.
    pub fn is_issued(&self) -> bool {
        matches!(self, Self::Issued)
    }
}

impl From<String> for CertificateStatus {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "ISSUED" => Self::Issued,
            "REVOKED" => Self::Revoked,
            _ => Self::Other(s),
        }
    }
}

impl From<CertificateStatus> for String {
    fn from(status: CertificateStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata of a remote certificate, fetched per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCertificateDescriptor {
    /// Remote identifier used to fetch content.
    pub id: String,
    /// Certificate name.
    pub name: String,
    /// Lifecycle status.
    pub status: CertificateStatus,
    /// Expiry of the remote certificate.
    pub not_after: DateTime<Utc>,
}

/// Chain and private key of a remote certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteCertificateContent {
    /// PEM blocks of the chain, leaf first.
    pub chain_parts: Vec<String>,
    /// PKCS#8 PEM private key.
    pub private_key: String,
}

impl RemoteCertificateContent {
    /// Create new content.
    pub fn new(chain_parts: Vec<String>, private_key: impl Into<String>) -> Self {
        Self {
            chain_parts,
            private_key: private_key.into(),
        }
    }

    /// Chain file bytes: every part followed by a newline.
    pub fn chain_pem(&self) -> String {
        let mut chain = String::new();
        for part in &self.chain_parts {
            chain.push_str(part);
            chain.push('\n');
        }
        chain
    }
}

impl fmt::Debug for RemoteCertificateContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCertificateContent")
            .field("chain_parts", &self.chain_parts.len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}
