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

//! REST adapter for the cloud Certificate Manager.
//!
//! Two endpoints are used:
//!
//! - `GET {api}/certificate-manager/v1/certificates?folderId=..` lists the
//!   certificates of a folder, paginated with `nextPageToken`
//! - `GET {data}/certificate-manager/v1/certificates/{id}:getContent` returns
//!   the chain and the private key, always requested as PKCS#8

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::RemoteCertificateSource;
use crate::error::{RenewError, Result};
use crate::metadata::TokenProvider;
use crate::types::{CertificateStatus, RemoteCertificateContent, RemoteCertificateDescriptor};
use crate::util::cancellable;

/// Default management API endpoint.
pub const DEFAULT_API_URL: &str = "https://certificate-manager.api.cloud.yandex.net";

/// Default data API endpoint (certificate content).
pub const DEFAULT_DATA_URL: &str = "https://data.certificate-manager.api.cloud.yandex.net";

/// Private key encoding requested from the data API.
pub const PRIVATE_KEY_FORMAT: &str = "PKCS8";

const CERTIFICATES_PATH: &str = "/certificate-manager/v1/certificates";
const PAGE_SIZE: &str = "100";

/// Longest error body quoted in an error message.
const MAX_ERROR_BODY: usize = 512;

/// Endpoints and timeouts for [`CertificateManagerClient`].
#[derive(Debug, Clone)]
pub struct CertificateManagerConfig {
    /// Management API base URL.
    pub api_url: Url,
    /// Data API base URL.
    pub data_url: Url,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for CertificateManagerConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse(DEFAULT_API_URL).expect("valid default URL"),
            data_url: Url::parse(DEFAULT_DATA_URL).expect("valid default URL"),
            timeout: Duration::from_secs(30),
        }
    }
}

impl CertificateManagerConfig {
    /// Build a configuration from endpoint strings.
    pub fn new(api_url: &str, data_url: &str, timeout: Duration) -> Result<Self> {
        let parse = |url: &str| {
            Url::parse(url).map_err(|e| RenewError::config(format!("invalid URL {url}: {e}")))
        };
        Ok(Self {
            api_url: parse(api_url)?,
            data_url: parse(data_url)?,
            timeout,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListCertificatesResponse {
    #[serde(default)]
    certificates: Vec<CertificateResource>,
    #[serde(default)]
    next_page_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CertificateResource {
    id: String,
    name: String,
    #[serde(default)]
    status: Option<CertificateStatus>,
    #[serde(default)]
    not_after: Option<DateTime<Utc>>,
}

impl From<CertificateResource> for RemoteCertificateDescriptor {
    fn from(resource: CertificateResource) -> Self {
        Self {
            id: resource.id,
            name: resource.name,
            status: resource
                .status
                .unwrap_or_else(|| CertificateStatus::Other("STATUS_UNSPECIFIED".to_string())),
            not_after: resource.not_after.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetContentResponse {
    #[serde(default)]
    certificate_chain: Vec<String>,
    #[serde(default)]
    private_key: String,
}

/// Certificate Manager client.
pub struct CertificateManagerClient {
    config: CertificateManagerConfig,
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
}

impl std::fmt::Debug for CertificateManagerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateManagerClient")
            .field("config", &self.config)
            .finish()
    }
}

impl CertificateManagerClient {
    /// Create a new client authenticating with `tokens`.
    pub fn new(config: CertificateManagerConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| RenewError::config(format!("could not build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http,
            tokens,
        })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &CertificateManagerConfig {
        &self.config
    }

    async fn list_page(
        &self,
        folder_id: &str,
        page_token: &str,
        token: &str,
    ) -> Result<ListCertificatesResponse> {
        let mut url = self.config.api_url.clone();
        url.set_path(CERTIFICATES_PATH);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("folderId", folder_id);
            query.append_pair("pageSize", PAGE_SIZE);
            if !page_token.is_empty() {
                query.append_pair("pageToken", page_token);
            }
        }
        debug!("GET {}", url);

        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await
            .map_err(|e| RenewError::lookup(e.to_string()))?;

        let response = check_status(response, RenewError::Lookup).await?;
        response
            .json()
            .await
            .map_err(|e| RenewError::lookup(format!("could not parse response: {e}")))
    }

    async fn find_in_pages(
        &self,
        folder_id: &str,
        name: &str,
        token: &str,
    ) -> Result<Option<RemoteCertificateDescriptor>> {
        let mut page_token = String::new();
        let mut seen = HashSet::new();
        loop {
            let page = self.list_page(folder_id, &page_token, token).await?;
            if let Some(found) = page.certificates.into_iter().find(|c| c.name == name) {
                return Ok(Some(found.into()));
            }
            // a token handed out twice means the listing cycles
            if page.next_page_token.is_empty() || !seen.insert(page.next_page_token.clone()) {
                return Ok(None);
            }
            page_token = page.next_page_token;
        }
    }

    async fn get_content(&self, certificate_id: &str, token: &str) -> Result<GetContentResponse> {
        let mut url = self.config.data_url.clone();
        url.set_path(&format!("{CERTIFICATES_PATH}/{certificate_id}:getContent"));
        url.query_pairs_mut()
            .append_pair("privateKeyFormat", PRIVATE_KEY_FORMAT);
        debug!("GET {}", url);

        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await
            .map_err(|e| RenewError::content(e.to_string()))?;

        let response = check_status(response, RenewError::Content).await?;
        response
            .json()
            .await
            .map_err(|e| RenewError::content(format!("could not parse response: {e}")))
    }
}

/// Map a non-2xx response to an error carrying status and body.
async fn check_status(
    response: reqwest::Response,
    err: fn(String) -> RenewError,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }

    let message = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            format!("access denied ({}): {}", status.as_u16(), body.trim())
        }
        _ => format!("abnormal status code {}: {}", status.as_u16(), body.trim()),
    };
    Err(err(message))
}

#[async_trait]
impl RemoteCertificateSource for CertificateManagerClient {
    async fn find_by_name(
        &self,
        folder_id: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<RemoteCertificateDescriptor>> {
        let token = self.tokens.token(cancel).await?;
        cancellable(cancel, self.find_in_pages(folder_id, name, &token)).await
    }

    async fn fetch_content(
        &self,
        certificate_id: &str,
        cancel: &CancellationToken,
    ) -> Result<RemoteCertificateContent> {
        let token = self.tokens.token(cancel).await?;
        let content = cancellable(cancel, self.get_content(certificate_id, &token)).await?;

        if content.certificate_chain.is_empty() {
            return Err(RenewError::content("response carries an empty chain"));
        }
        if content.private_key.is_empty() {
            return Err(RenewError::content("response carries no private key"));
        }

        Ok(RemoteCertificateContent::new(
            content.certificate_chain,
            content.private_key,
        ))
    }
}
