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

//! Instance metadata: host identity and IAM tokens.
//!
//! Compute instances expose a link-local metadata service. It tells us which
//! folder the instance belongs to (the scope for certificate lookups) and
//! hands out short-lived IAM tokens for the instance's service account.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{RenewError, Result};
use crate::util::cancellable;

/// Default metadata service address.
pub const DEFAULT_METADATA_URL: &str = "http://169.254.169.254";

/// Metadata paths.
pub mod paths {
    /// Recursive instance document.
    pub const INSTANCE: &str = "/computeMetadata/v1/instance/";

    /// Default service account token.
    pub const TOKEN: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
}

/// Header required by the metadata service.
const METADATA_FLAVOR: (&str, &str) = ("Metadata-Flavor", "Google");

/// Capability for obtaining a bearer token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a token valid for at least the next few minutes.
    async fn token(&self, cancel: &CancellationToken) -> Result<String>;
}

/// A token supplied up front.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap an existing token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self, _cancel: &CancellationToken) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Identity of the running instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InstanceIdentity {
    /// Instance id.
    pub id: String,
    /// Fully qualified hostname.
    pub hostname: String,
    /// Instance name.
    pub name: String,
    /// Cloud placement.
    pub vendor: Vendor,
}

/// Cloud placement of the instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Vendor {
    /// Cloud id.
    pub cloud_id: String,
    /// Folder id; scope for certificate lookups.
    pub folder_id: String,
}

/// IAM token issued to the instance service account.
#[derive(Clone, Deserialize)]
pub struct IamToken {
    /// Bearer token.
    pub access_token: String,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: u64,
    /// Token type, normally `Bearer`.
    #[serde(default)]
    pub token_type: String,
}

impl fmt::Debug for IamToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IamToken")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Client for the instance metadata service.
#[derive(Debug, Clone)]
pub struct InstanceMetadataClient {
    base_url: Url,
    http: reqwest::Client,
}

impl InstanceMetadataClient {
    /// Create a client for the metadata service at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| RenewError::config(format!("invalid metadata URL {base_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| RenewError::metadata(e.to_string()))?;

        Ok(Self { base_url, http })
    }

    /// Fetch the identity document of this instance.
    pub async fn identity(&self, cancel: &CancellationToken) -> Result<InstanceIdentity> {
        let mut url = self.base_url.clone();
        url.set_path(paths::INSTANCE);
        url.set_query(Some("recursive=true"));

        let identity: InstanceIdentity =
            cancellable(cancel, self.get_json(url, RenewError::Metadata)).await?;
        if identity.vendor.folder_id.is_empty() {
            return Err(RenewError::metadata("instance metadata carries no folder id"));
        }
        Ok(identity)
    }

    /// Fetch an IAM token for the default service account.
    pub async fn iam_token(&self, cancel: &CancellationToken) -> Result<IamToken> {
        let mut url = self.base_url.clone();
        url.set_path(paths::TOKEN);

        let token: IamToken = cancellable(cancel, self.get_json(url, RenewError::Token)).await?;
        if token.access_token.is_empty() {
            return Err(RenewError::token("metadata returned an empty token"));
        }
        Ok(token)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        err: fn(String) -> RenewError,
    ) -> Result<T> {
        tracing::debug!("GET {}", url);

        let response = self
            .http
            .get(url)
            .header(METADATA_FLAVOR.0, METADATA_FLAVOR.1)
            .send()
            .await
            .map_err(|e| err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(err(format!("abnormal status code {}", status.as_u16())));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| err(format!("could not parse response: {e}")))
    }
}

#[async_trait]
impl TokenProvider for InstanceMetadataClient {
    async fn token(&self, cancel: &CancellationToken) -> Result<String> {
        Ok(self.iam_token(cancel).await?.access_token)
    }
}
