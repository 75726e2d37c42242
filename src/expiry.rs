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

//! Expiry inspection of locally installed certificate chains.
//!
//! The effective expiry of a chain file is the `notAfter` of its leaf
//! certificate: the first certificate that is not a CA. A chain made only of
//! CA certificates falls back to its first block. Non-certificate PEM blocks
//! (keys, parameters) are skipped.
//!
//! Callers treat any error here as "unknown expiry" and force a renewal
//! attempt rather than failing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use der::Decode;
use std::path::Path;
use x509_cert::Certificate;
use x509_cert::ext::pkix::BasicConstraints;
use x509_cert::time::Time;

use crate::error::{RenewError, Result};

/// PEM label of certificate blocks.
const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// Source of the local expiry date of a chain file.
#[async_trait]
pub trait ExpiryInspector: Send + Sync {
    /// Return the leaf certificate's expiry for the chain at `path`.
    async fn leaf_expiry(&self, path: &Path) -> Result<DateTime<Utc>>;
}

/// Reads PEM chain files from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct PemChainInspector;

#[async_trait]
impl ExpiryInspector for PemChainInspector {
    async fn leaf_expiry(&self, path: &Path) -> Result<DateTime<Utc>> {
        let pem = tokio::fs::read(path)
            .await
            .map_err(|e| RenewError::read(path, e))?;

        chain_leaf_expiry(&pem).map_err(|e| match e {
            RenewError::NoCertificates { .. } => RenewError::NoCertificates {
                path: path.to_path_buf(),
            },
            other => other,
        })
    }
}

/// Return the leaf expiry of a PEM chain held in memory.
pub fn chain_leaf_expiry(pem: &[u8]) -> Result<DateTime<Utc>> {
    let certs = decode_chain(pem)?;

    let leaf = certs
        .iter()
        .find(|cert| !is_ca_certificate(cert))
        .or_else(|| certs.first())
        .ok_or_else(|| RenewError::NoCertificates {
            path: Default::default(),
        })?;

    not_after(leaf)
}

/// Decode all certificate blocks of a PEM chain, in file order.
///
/// Blocks with any other label are skipped without being decoded, so a
/// damaged key or parameters block does not hide the certificates.
pub fn decode_chain(pem: &[u8]) -> Result<Vec<Certificate>> {
    let text = String::from_utf8_lossy(pem);

    pem_sections(&text)
        .into_iter()
        .filter(|(label, _)| *label == CERTIFICATE_LABEL)
        .map(|(_, section)| {
            let block = pem::parse(section).map_err(|e| RenewError::parse(e.to_string()))?;
            Certificate::from_der(block.contents()).map_err(|e| RenewError::parse(e.to_string()))
        })
        .collect()
}

/// Split `text` into `(label, BEGIN..END section)` pairs.
///
/// A BEGIN line without a matching END line is ignored.
fn pem_sections(text: &str) -> Vec<(&str, &str)> {
    const BEGIN: &str = "-----BEGIN ";
    const DASHES: &str = "-----";

    let mut sections = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(BEGIN) {
        let block = &rest[start..];
        let after_begin = &block[BEGIN.len()..];

        let Some(label_len) = after_begin.find(DASHES) else {
            break;
        };
        let label = &after_begin[..label_len];
        let end_marker = format!("-----END {label}-----");

        match block.find(&end_marker) {
            Some(end) if !label.contains('\n') => {
                let len = end + end_marker.len();
                sections.push((label, &block[..len]));
                rest = &block[len..];
            }
            _ => rest = after_begin,
        }
    }

    sections
}

/// Returns true if the certificate carries basic constraints with `cA` set.
pub fn is_ca_certificate(cert: &Certificate) -> bool {
    let Some(extensions) = &cert.tbs_certificate.extensions else {
        return false;
    };

    extensions
        .iter()
        .filter(|ext| ext.extn_id == const_oid::db::rfc5280::ID_CE_BASIC_CONSTRAINTS)
        .filter_map(|ext| BasicConstraints::from_der(ext.extn_value.as_bytes()).ok())
        .any(|bc| bc.ca)
}

/// Expiry of a certificate as a UTC timestamp.
pub fn not_after(cert: &Certificate) -> Result<DateTime<Utc>> {
    let duration = match &cert.tbs_certificate.validity.not_after {
        Time::UtcTime(utc) => utc.to_unix_duration(),
        Time::GeneralTime(r#gen) => r#gen.to_unix_duration(),
    };

    let secs = i64::try_from(duration.as_secs())
        .map_err(|_| RenewError::parse("certificate expiry out of range"))?;

    DateTime::from_timestamp(secs, duration.subsec_nanos())
        .ok_or_else(|| RenewError::parse("certificate expiry out of range"))
}
