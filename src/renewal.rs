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

//! Batch certificate renewal.
//!
//! [`RenewalOrchestrator`] drives a batch of [`CertificateJob`]s:
//!
//! 1. every job runs as its own task: inspect the local chain, ask the
//!    remote source for a newer certificate, install chain then key
//! 2. all tasks are joined before anything else happens
//! 3. every distinct service named by the batch is restarted exactly once
//!
//! A failing job is logged and reported, and never affects its siblings.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use certrenewer::metadata::StaticToken;
//! use certrenewer::renewal::RenewalOrchestrator;
//! use certrenewer::restart::SystemctlRestarter;
//! use certrenewer::source::{CertificateManagerClient, CertificateManagerConfig};
//! use certrenewer::types::CertificateJob;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = CertificateManagerClient::new(
//!     CertificateManagerConfig::default(),
//!     Arc::new(StaticToken::new("t1.token")),
//! )?;
//! let orchestrator = RenewalOrchestrator::new(
//!     "b1gfolder",
//!     Arc::new(source),
//!     Arc::new(SystemctlRestarter::default()),
//! );
//!
//! let jobs = vec![CertificateJob::new(
//!     "web",
//!     "/etc/ssl/private/web.key",
//!     "/etc/ssl/certs/web.pem",
//!     "nginx",
//! )];
//! let report = orchestrator.run(&jobs, &CancellationToken::new()).await;
//! println!("{}/{} succeeded", report.aggregate.success, report.aggregate.total);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{RenewError, Result};
use crate::expiry::{ExpiryInspector, PemChainInspector};
use crate::replace::{self, CHAIN_MODE, KEY_MODE};
use crate::restart::ServiceRestarter;
use crate::source::{RemoteCertificateSource, check_certificate};
use crate::types::{CertificateJob, RenewalAggregate, ServiceGroup};

/// What happened to a single job.
#[derive(Debug)]
pub enum JobOutcome {
    /// A newer certificate was installed.
    Installed,
    /// The installed certificate is current.
    UpToDate,
    /// The job was abandoned.
    Failed(RenewError),
}

impl JobOutcome {
    /// Returns true if new material was written.
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed)
    }

    /// The failure, if any.
    pub fn error(&self) -> Option<&RenewError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Outcome of one job, in batch order.
#[derive(Debug)]
pub struct JobReport {
    /// Certificate name.
    pub name: String,
    /// Service the certificate belongs to.
    pub service: String,
    /// Result of the job.
    pub outcome: JobOutcome,
}

/// Outcome of one service restart.
#[derive(Debug)]
pub struct ServiceReport {
    /// Service name.
    pub service: String,
    /// Number of jobs naming this service.
    pub jobs: usize,
    /// Restart result.
    pub result: Result<()>,
}

/// Result of an orchestration pass.
#[derive(Debug, Default)]
pub struct RenewalReport {
    /// Batch aggregate.
    pub aggregate: RenewalAggregate,
    /// Per-job outcomes in input order.
    pub jobs: Vec<JobReport>,
    /// Per-service restart outcomes.
    pub services: Vec<ServiceReport>,
}

impl RenewalReport {
    /// Number of jobs that installed new material.
    ///
    /// Unlike [`RenewalAggregate::success`], this does not depend on the
    /// service restart.
    pub fn installed(&self) -> usize {
        self.count(JobOutcome::is_installed)
    }

    /// Number of jobs that were already current.
    pub fn up_to_date(&self) -> usize {
        self.count(|o| matches!(o, JobOutcome::UpToDate))
    }

    /// Number of failed jobs.
    pub fn failed(&self) -> usize {
        self.count(|o| o.error().is_some())
    }

    /// Names of services whose restart failed.
    pub fn failed_services(&self) -> Vec<&str> {
        self.services
            .iter()
            .filter(|s| s.result.is_err())
            .map(|s| s.service.as_str())
            .collect()
    }

    fn count(&self, pred: impl Fn(&JobOutcome) -> bool) -> usize {
        self.jobs.iter().filter(|j| pred(&j.outcome)).count()
    }
}

/// Coordinates renewal of a batch of certificates.
pub struct RenewalOrchestrator {
    folder_id: String,
    source: Arc<dyn RemoteCertificateSource>,
    restarter: Arc<dyn ServiceRestarter>,
    inspector: Arc<dyn ExpiryInspector>,
}

impl RenewalOrchestrator {
    /// Create an orchestrator looking up certificates in `folder_id`.
    ///
    /// Local chains are inspected with [`PemChainInspector`].
    pub fn new(
        folder_id: impl Into<String>,
        source: Arc<dyn RemoteCertificateSource>,
        restarter: Arc<dyn ServiceRestarter>,
    ) -> Self {
        Self {
            folder_id: folder_id.into(),
            source,
            restarter,
            inspector: Arc::new(PemChainInspector),
        }
    }

    /// Replace the local expiry inspector.
    pub fn with_inspector(mut self, inspector: Arc<dyn ExpiryInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    /// Folder certificates are looked up in.
    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }

    /// Run one pass over `jobs`.
    ///
    /// Never fails as a whole. Every job error is captured in the report.
    pub async fn run(&self, jobs: &[CertificateJob], cancel: &CancellationToken) -> RenewalReport {
        let total = jobs.len();
        let group = ServiceGroup::from_jobs(jobs);
        info!(total, services = group.len(), "starting renewal pass");

        let handles: Vec<_> = jobs
            .iter()
            .enumerate()
            .map(|(index, job)| {
                let task = JobTask {
                    job: job.clone(),
                    progress: format!("{}/{}", index + 1, total),
                    folder_id: self.folder_id.clone(),
                    source: Arc::clone(&self.source),
                    inspector: Arc::clone(&self.inspector),
                    cancel: cancel.clone(),
                };
                tokio::spawn(task.run())
            })
            .collect();

        let mut reports = Vec::with_capacity(total);
        for (job, handle) in jobs.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let err = RenewError::internal(format!("renewal task aborted: {e}"));
                    error!(cert = %job.name, error = %err, "renewal task did not complete");
                    JobOutcome::Failed(err)
                }
            };
            reports.push(JobReport {
                name: job.name.clone(),
                service: job.service_name.clone(),
                outcome,
            });
        }

        let (success, services) = self.restart_services(&group, cancel).await;

        let report = RenewalReport {
            aggregate: RenewalAggregate { total, success },
            jobs: reports,
            services,
        };
        info!(
            total,
            success,
            installed = report.installed(),
            failed = report.failed(),
            "renewal pass finished"
        );
        report
    }

    /// Restart every service of the batch once.
    ///
    /// A successful restart credits all jobs naming the service, whatever
    /// their own outcome.
    async fn restart_services(
        &self,
        group: &ServiceGroup,
        cancel: &CancellationToken,
    ) -> (usize, Vec<ServiceReport>) {
        let mut success = 0;
        let mut reports = Vec::with_capacity(group.len());

        for (service, jobs) in group.iter() {
            info!(service, jobs, "restarting service");
            let result = self.restarter.restart(service, cancel).await;
            match &result {
                Ok(()) => {
                    success += jobs;
                    info!(service, "service restarted");
                }
                Err(e) => error!(service, error = %e, "service restart failed"),
            }
            reports.push(ServiceReport {
                service: service.to_string(),
                jobs,
                result,
            });
        }

        (success, reports)
    }
}

/// Owned state of one spawned job.
struct JobTask {
    job: CertificateJob,
    progress: String,
    folder_id: String,
    source: Arc<dyn RemoteCertificateSource>,
    inspector: Arc<dyn ExpiryInspector>,
    cancel: CancellationToken,
}

impl JobTask {
    async fn run(self) -> JobOutcome {
        match self.renew().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    cert = %self.job.name,
                    progress = %self.progress,
                    stage = %e.stage(),
                    error = %e,
                    "renewal failed"
                );
                JobOutcome::Failed(e)
            }
        }
    }

    async fn renew(&self) -> Result<JobOutcome> {
        let job = &self.job;
        info!(cert = %job.name, progress = %self.progress, "checking certificate");

        let due_date = self.local_expiry().await;
        let content = check_certificate(
            self.source.as_ref(),
            &self.folder_id,
            &job.name,
            due_date,
            &self.cancel,
        )
        .await?;

        let Some(content) = content else {
            info!(cert = %job.name, progress = %self.progress, "no update needed");
            return Ok(JobOutcome::UpToDate);
        };

        replace::replace(&job.chain_path, content.chain_pem().as_bytes(), CHAIN_MODE).await?;
        replace::replace(&job.private_key_path, content.private_key.as_bytes(), KEY_MODE).await?;

        info!(
            cert = %job.name,
            progress = %self.progress,
            chain = %job.chain_path.display(),
            "certificate installed"
        );
        Ok(JobOutcome::Installed)
    }

    /// Leaf expiry of the installed chain, or the epoch when unknown.
    async fn local_expiry(&self) -> DateTime<Utc> {
        let path = &self.job.chain_path;
        match self.inspector.leaf_expiry(path).await {
            Ok(expiry) => {
                debug!(cert = %self.job.name, expiry = %expiry, "local certificate expiry");
                expiry
            }
            Err(e) => {
                warn!(
                    cert = %self.job.name,
                    path = %path.display(),
                    error = %e,
                    "could not determine local expiry, forcing update"
                );
                DateTime::<Utc>::UNIX_EPOCH
            }
        }
    }
}
