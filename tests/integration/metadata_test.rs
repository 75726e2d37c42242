// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Instance metadata tests

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use certrenewer::{
    CertificateManagerClient, CertificateManagerConfig, InstanceMetadataClient,
    RemoteCertificateSource, RenewError, TokenProvider,
};

use crate::integration::{
    MockCertificateManager, MockMetadata, PATH_INSTANCE, PATH_TOKEN, TEST_TOKEN,
    certificate_resource, utc,
};

fn metadata_client(mock: &MockMetadata) -> InstanceMetadataClient {
    InstanceMetadataClient::new(&mock.url(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_identity() {
    let mock = MockMetadata::start().await;
    mock.mock_identity("b1gfolder").await;

    let identity = metadata_client(&mock)
        .identity(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(identity.name, "web-1");
    assert_eq!(identity.vendor.folder_id, "b1gfolder");
}

#[tokio::test]
async fn test_identity_without_folder() {
    let mock = MockMetadata::start().await;
    mock.mock_identity("").await;

    let err = metadata_client(&mock)
        .identity(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RenewError::Metadata(_)));
}

#[tokio::test]
async fn test_identity_unavailable() {
    let mock = MockMetadata::start().await;
    mock.mock_status(PATH_INSTANCE, 404).await;

    let err = metadata_client(&mock)
        .identity(&CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        RenewError::Metadata(message) => assert!(message.contains("404"), "{message}"),
        other => panic!("expected metadata error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_token() {
    let mock = MockMetadata::start().await;
    mock.mock_token(TEST_TOKEN).await;

    let client = metadata_client(&mock);
    let token = client.iam_token(&CancellationToken::new()).await.unwrap();
    assert_eq!(token.access_token, TEST_TOKEN);
    assert_eq!(token.token_type, "Bearer");

    let token = client.token(&CancellationToken::new()).await.unwrap();
    assert_eq!(token, TEST_TOKEN);
}

#[tokio::test]
async fn test_token_unavailable() {
    let mock = MockMetadata::start().await;
    mock.mock_status(PATH_TOKEN, 500).await;

    let err = metadata_client(&mock)
        .token(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RenewError::Token(_)));
}

#[tokio::test]
async fn test_certificate_manager_with_metadata_token() {
    let metadata = MockMetadata::start().await;
    metadata.mock_token(TEST_TOKEN).await;

    // the list mock only matches the bearer token served by metadata
    let manager = MockCertificateManager::start().await;
    manager
        .mock_list(
            "b1gfolder",
            vec![certificate_resource("fpq2", "web", "ISSUED", utc(2031, 6, 15))],
        )
        .await;

    let config =
        CertificateManagerConfig::new(&manager.url(), &manager.url(), Duration::from_secs(5))
            .unwrap();
    let client = CertificateManagerClient::new(config, Arc::new(metadata_client(&metadata))).unwrap();

    let found = client
        .find_by_name("b1gfolder", "web", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(found.map(|d| d.id).as_deref(), Some("fpq2"));
}

#[tokio::test]
async fn test_token_failure_fails_lookup() {
    let metadata = MockMetadata::start().await;
    metadata.mock_status(PATH_TOKEN, 503).await;
    let manager = MockCertificateManager::start().await;

    let config =
        CertificateManagerConfig::new(&manager.url(), &manager.url(), Duration::from_secs(5))
            .unwrap();
    let client = CertificateManagerClient::new(config, Arc::new(metadata_client(&metadata))).unwrap();

    let err = client
        .find_by_name("b1gfolder", "web", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RenewError::Token(_)));
}
