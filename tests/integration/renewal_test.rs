// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! End-to-end renewal passes against a mock Certificate Manager

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use certrenewer::expiry::chain_leaf_expiry;
use certrenewer::replace::backup_path;
use certrenewer::{
    CertificateManagerClient, CertificateManagerConfig, JobOutcome, RenewError,
    RenewalAggregate, RenewalOrchestrator, StaticToken,
};

use crate::integration::{
    FakeRestarter, MockCertificateManager, TEST_TOKEN, TestPki, certificate_resource, utc,
    write_job,
};

const FOLDER: &str = "b1gfolder";

fn orchestrator(mock: &MockCertificateManager, restarter: Arc<FakeRestarter>) -> RenewalOrchestrator {
    let config =
        CertificateManagerConfig::new(&mock.url(), &mock.url(), Duration::from_secs(5)).unwrap();
    let source =
        CertificateManagerClient::new(config, Arc::new(StaticToken::new(TEST_TOKEN))).unwrap();
    RenewalOrchestrator::new(FOLDER, Arc::new(source), restarter)
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[tokio::test]
async fn test_newer_remote_certificate_installed() {
    let pki = TestPki::new();
    let dir = tempdir().unwrap();
    let (old_chain, old_key) = pki.chain(2030, 6, 15);
    let job = write_job(dir.path(), "web", "nginx", &old_chain, &old_key);

    let (new_parts, new_key) = pki.chain_parts(2031, 6, 15);
    let mock = MockCertificateManager::start().await;
    mock.mock_list(
        FOLDER,
        vec![certificate_resource("fpq2", "web", "ISSUED", utc(2031, 6, 15))],
    )
    .await;
    mock.mock_content("fpq2", &new_parts, &new_key, 1).await;

    let restarter = Arc::new(FakeRestarter::default());
    let report = orchestrator(&mock, restarter.clone())
        .run(std::slice::from_ref(&job), &CancellationToken::new())
        .await;

    assert!(matches!(report.jobs[0].outcome, JobOutcome::Installed));
    assert_eq!(report.aggregate, RenewalAggregate { total: 1, success: 1 });
    assert_eq!(restarter.calls(), vec!["nginx"]);

    assert_eq!(read(&job.chain_path), format!("{}\n{}\n", new_parts[0], new_parts[1]));
    assert_eq!(read(&job.private_key_path), new_key);
    assert_eq!(read(&backup_path(&job.chain_path)), old_chain);
    assert_eq!(read(&backup_path(&job.private_key_path)), old_key);

    // the installed chain is what the next pass inspects
    let expiry = chain_leaf_expiry(&std::fs::read(&job.chain_path).unwrap()).unwrap();
    assert_eq!(expiry, utc(2031, 6, 15));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = |p: &Path| std::fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&job.chain_path), 0o644);
        assert_eq!(mode(&job.private_key_path), 0o600);
    }
}

#[tokio::test]
async fn test_equal_expiry_left_untouched() {
    let pki = TestPki::new();
    let dir = tempdir().unwrap();
    let (chain, key) = pki.chain(2030, 6, 15);
    let job = write_job(dir.path(), "web", "nginx", &chain, &key);

    let mock = MockCertificateManager::start().await;
    mock.mock_list(
        FOLDER,
        vec![certificate_resource("fpq2", "web", "ISSUED", utc(2030, 6, 15))],
    )
    .await;
    mock.mock_content("fpq2", &[], "", 0).await;

    let restarter = Arc::new(FakeRestarter::default());
    let report = orchestrator(&mock, restarter.clone())
        .run(std::slice::from_ref(&job), &CancellationToken::new())
        .await;

    assert!(matches!(report.jobs[0].outcome, JobOutcome::UpToDate));
    assert_eq!(report.installed(), 0);
    // the service is restarted even when nothing changed
    assert_eq!(report.aggregate, RenewalAggregate { total: 1, success: 1 });
    assert_eq!(restarter.calls(), vec!["nginx"]);

    assert_eq!(read(&job.chain_path), chain);
    assert!(!backup_path(&job.chain_path).exists());
    assert!(!backup_path(&job.private_key_path).exists());
}

#[tokio::test]
async fn test_second_pass_is_idempotent() {
    let pki = TestPki::new();
    let dir = tempdir().unwrap();
    let (old_chain, old_key) = pki.chain(2030, 6, 15);
    let job = write_job(dir.path(), "web", "nginx", &old_chain, &old_key);

    let (new_parts, new_key) = pki.chain_parts(2031, 6, 15);
    let mock = MockCertificateManager::start().await;
    mock.mock_list(
        FOLDER,
        vec![certificate_resource("fpq2", "web", "ISSUED", utc(2031, 6, 15))],
    )
    .await;
    // content is fetched by the first pass only
    mock.mock_content("fpq2", &new_parts, &new_key, 1).await;

    let orchestrator = orchestrator(&mock, Arc::new(FakeRestarter::default()));
    let cancel = CancellationToken::new();

    let first = orchestrator.run(std::slice::from_ref(&job), &cancel).await;
    assert_eq!(first.installed(), 1);
    let installed = read(&job.chain_path);

    let second = orchestrator.run(std::slice::from_ref(&job), &cancel).await;
    assert_eq!(second.installed(), 0);
    assert_eq!(second.up_to_date(), 1);
    assert_eq!(read(&job.chain_path), installed);
    assert_eq!(read(&backup_path(&job.chain_path)), old_chain);
}

#[tokio::test]
async fn test_unreadable_chain_forces_update() {
    let pki = TestPki::new();
    let dir = tempdir().unwrap();
    let job = write_job(dir.path(), "web", "nginx", "not a certificate", "not a key");

    let (new_parts, new_key) = pki.chain_parts(2026, 1, 1);
    let mock = MockCertificateManager::start().await;
    mock.mock_list(
        FOLDER,
        vec![certificate_resource("fpq2", "web", "ISSUED", utc(2026, 1, 1))],
    )
    .await;
    mock.mock_content("fpq2", &new_parts, &new_key, 1).await;

    let report = orchestrator(&mock, Arc::new(FakeRestarter::default()))
        .run(std::slice::from_ref(&job), &CancellationToken::new())
        .await;

    assert!(matches!(report.jobs[0].outcome, JobOutcome::Installed));
    assert_eq!(read(&backup_path(&job.chain_path)), "not a certificate");
    assert_eq!(read(&job.private_key_path), new_key);
}

#[tokio::test]
async fn test_missing_chain_file_fails_at_backup() {
    let pki = TestPki::new();
    let dir = tempdir().unwrap();
    let mut job = write_job(dir.path(), "web", "nginx", "", "");
    job.chain_path = dir.path().join("absent.pem");

    let (new_parts, new_key) = pki.chain_parts(2031, 6, 15);
    let mock = MockCertificateManager::start().await;
    mock.mock_list(
        FOLDER,
        vec![certificate_resource("fpq2", "web", "ISSUED", utc(2031, 6, 15))],
    )
    .await;
    mock.mock_content("fpq2", &new_parts, &new_key, 1).await;

    let report = orchestrator(&mock, Arc::new(FakeRestarter::default()))
        .run(std::slice::from_ref(&job), &CancellationToken::new())
        .await;

    assert!(matches!(
        report.jobs[0].outcome,
        JobOutcome::Failed(RenewError::Backup { .. })
    ));
    assert!(!job.chain_path.exists());
    // the key is installed after the chain, so it is never reached
    assert_eq!(read(&job.private_key_path), "");
}

#[tokio::test]
async fn test_missing_key_fails_after_chain_installed() {
    let pki = TestPki::new();
    let dir = tempdir().unwrap();
    let (old_chain, old_key) = pki.chain(2030, 6, 15);
    let broken = write_job(dir.path(), "web", "nginx", &old_chain, &old_key);
    let sibling = write_job(dir.path(), "api", "haproxy", &old_chain, &old_key);
    std::fs::remove_file(&broken.private_key_path).unwrap();

    let (new_parts, new_key) = pki.chain_parts(2031, 6, 15);
    let mock = MockCertificateManager::start().await;
    mock.mock_list(
        FOLDER,
        vec![
            certificate_resource("fpq1", "web", "ISSUED", utc(2031, 6, 15)),
            certificate_resource("fpq2", "api", "ISSUED", utc(2031, 6, 15)),
        ],
    )
    .await;
    mock.mock_content("fpq1", &new_parts, &new_key, 1).await;
    mock.mock_content("fpq2", &new_parts, &new_key, 1).await;

    let jobs = vec![broken.clone(), sibling.clone()];
    let report = orchestrator(&mock, Arc::new(FakeRestarter::default()))
        .run(&jobs, &CancellationToken::new())
        .await;

    match &report.jobs[0].outcome {
        JobOutcome::Failed(RenewError::Backup { path, .. }) => {
            assert_eq!(path, &broken.private_key_path)
        }
        other => panic!("expected key backup error, got {other:?}"),
    }
    // the new chain stays in place next to its backup
    let expiry = chain_leaf_expiry(&std::fs::read(&broken.chain_path).unwrap()).unwrap();
    assert_eq!(expiry, utc(2031, 6, 15));
    assert_eq!(read(&backup_path(&broken.chain_path)), old_chain);
    assert!(!broken.private_key_path.exists());

    assert!(matches!(report.jobs[1].outcome, JobOutcome::Installed));
    assert_eq!(read(&sibling.private_key_path), new_key);
    assert_eq!(report.failed(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_unwritable_chain_fails_at_write() {
    use std::os::unix::fs::PermissionsExt;

    let pki = TestPki::new();
    let dir = tempdir().unwrap();
    let (old_chain, old_key) = pki.chain(2030, 6, 15);
    let locked = write_job(dir.path(), "web", "nginx", &old_chain, &old_key);
    let sibling = write_job(dir.path(), "api", "haproxy", &old_chain, &old_key);
    std::fs::set_permissions(&locked.chain_path, std::fs::Permissions::from_mode(0o444)).unwrap();
    if std::fs::OpenOptions::new().write(true).open(&locked.chain_path).is_ok() {
        // permission bits are not enforced for this user
        return;
    }

    let (new_parts, new_key) = pki.chain_parts(2031, 6, 15);
    let mock = MockCertificateManager::start().await;
    mock.mock_list(
        FOLDER,
        vec![
            certificate_resource("fpq1", "web", "ISSUED", utc(2031, 6, 15)),
            certificate_resource("fpq2", "api", "ISSUED", utc(2031, 6, 15)),
        ],
    )
    .await;
    mock.mock_content("fpq1", &new_parts, &new_key, 1).await;
    mock.mock_content("fpq2", &new_parts, &new_key, 1).await;

    let jobs = vec![locked.clone(), sibling.clone()];
    let report = orchestrator(&mock, Arc::new(FakeRestarter::default()))
        .run(&jobs, &CancellationToken::new())
        .await;

    assert!(matches!(
        report.jobs[0].outcome,
        JobOutcome::Failed(RenewError::Write { .. })
    ));
    assert_eq!(read(&locked.chain_path), old_chain);
    assert_eq!(read(&backup_path(&locked.chain_path)), old_chain);
    assert_eq!(read(&locked.private_key_path), old_key);

    assert!(matches!(report.jobs[1].outcome, JobOutcome::Installed));
    assert_eq!(read(&sibling.private_key_path), new_key);
}

#[tokio::test]
async fn test_failures_are_isolated() {
    let pki = TestPki::new();
    let dir = tempdir().unwrap();

    let (chain, key) = pki.chain(2030, 6, 15);
    let web = write_job(dir.path(), "web", "nginx", &chain, &key);
    let revoked = write_job(dir.path(), "mail", "postfix", &chain, &key);
    let missing = write_job(dir.path(), "ghost", "haproxy", &chain, &key);
    let api = write_job(dir.path(), "api", "nginx", &chain, &key);

    let mock = MockCertificateManager::start().await;
    mock.mock_list(
        FOLDER,
        vec![
            certificate_resource("fpq1", "web", "ISSUED", utc(2031, 6, 15)),
            certificate_resource("fpq2", "mail", "REVOKED", utc(2031, 6, 15)),
            certificate_resource("fpq3", "api", "ISSUED", utc(2031, 6, 15)),
        ],
    )
    .await;
    let (parts, new_key) = pki.chain_parts(2031, 6, 15);
    mock.mock_content("fpq1", &parts, &new_key, 1).await;
    mock.mock_content("fpq2", &parts, &new_key, 0).await;
    mock.mock_content("fpq3", &parts, &new_key, 1).await;

    let restarter = Arc::new(FakeRestarter::default());
    let jobs = vec![web.clone(), revoked.clone(), missing.clone(), api.clone()];
    let report = orchestrator(&mock, restarter.clone())
        .run(&jobs, &CancellationToken::new())
        .await;

    let names: Vec<_> = report.jobs.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, ["web", "mail", "ghost", "api"]);

    assert!(matches!(report.jobs[0].outcome, JobOutcome::Installed));
    assert!(matches!(
        report.jobs[1].outcome,
        JobOutcome::Failed(RenewError::AbnormalStatus { .. })
    ));
    assert!(matches!(
        report.jobs[2].outcome,
        JobOutcome::Failed(RenewError::CertificateNotFound { .. })
    ));
    assert!(matches!(report.jobs[3].outcome, JobOutcome::Installed));

    assert_eq!(read(&revoked.chain_path), chain);
    assert!(!backup_path(&revoked.chain_path).exists());
    assert_eq!(read(&missing.chain_path), chain);

    // nginx is shared by two jobs but restarted once
    assert_eq!(restarter.calls(), vec!["haproxy", "nginx", "postfix"]);
    assert_eq!(report.aggregate, RenewalAggregate { total: 4, success: 4 });
    assert_eq!(report.installed(), 2);
    assert_eq!(report.failed(), 2);
}

#[tokio::test]
async fn test_failed_restart_withholds_success() {
    let pki = TestPki::new();
    let dir = tempdir().unwrap();
    let (chain, key) = pki.chain(2030, 6, 15);
    let jobs = vec![
        write_job(dir.path(), "web", "nginx", &chain, &key),
        write_job(dir.path(), "api", "nginx", &chain, &key),
        write_job(dir.path(), "mail", "postfix", &chain, &key),
    ];

    let mock = MockCertificateManager::start().await;
    mock.mock_list(
        FOLDER,
        vec![
            certificate_resource("fpq1", "web", "ISSUED", utc(2030, 6, 15)),
            certificate_resource("fpq2", "api", "ISSUED", utc(2030, 6, 15)),
            certificate_resource("fpq3", "mail", "ISSUED", utc(2030, 6, 15)),
        ],
    )
    .await;

    let restarter = Arc::new(FakeRestarter::failing(&["nginx"]));
    let report = orchestrator(&mock, restarter.clone())
        .run(&jobs, &CancellationToken::new())
        .await;

    assert_eq!(report.up_to_date(), 3);
    assert_eq!(report.aggregate, RenewalAggregate { total: 3, success: 1 });
    assert_eq!(report.failed_services(), vec!["nginx"]);
    assert_eq!(restarter.calls(), vec!["nginx", "postfix"]);
}

#[tokio::test]
async fn test_lookup_outage_fails_every_job() {
    let pki = TestPki::new();
    let dir = tempdir().unwrap();
    let (chain, key) = pki.chain(2030, 6, 15);
    let jobs = vec![
        write_job(dir.path(), "web", "nginx", &chain, &key),
        write_job(dir.path(), "api", "nginx", &chain, &key),
    ];

    let mock = MockCertificateManager::start().await;
    mock.mock_status(
        crate::integration::PATH_CERTIFICATES,
        503,
        "service unavailable",
    )
    .await;

    let report = orchestrator(&mock, Arc::new(FakeRestarter::default()))
        .run(&jobs, &CancellationToken::new())
        .await;

    assert_eq!(report.failed(), 2);
    for job in &report.jobs {
        assert!(matches!(job.outcome, JobOutcome::Failed(RenewError::Lookup(_))));
    }
    assert_eq!(read(&jobs[0].chain_path), chain);
}
