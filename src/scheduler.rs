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

//! Periodic renewal.
//!
//! [`RenewalScheduler`] runs a renewal pass every `renewal_period` and logs
//! a heartbeat every `heartbeat_period`, until its cancellation token fires.
//! Passes never overlap: a pass that overruns its period delays the next
//! one instead of stacking up.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::RenewerConfig;
use crate::duration::format_duration;
use crate::renewal::{RenewalOrchestrator, RenewalReport};
use crate::types::{CertificateJob, RenewalAggregate};

/// Shortest accepted period; tokio intervals reject zero.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Timing of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// Interval between passes.
    pub renewal_period: Duration,
    /// Interval between heartbeat lines.
    pub heartbeat_period: Duration,
    /// Run the first pass immediately instead of after one period.
    pub run_on_start: bool,
}

impl ScheduleConfig {
    /// Schedule with a heartbeat every tenth of `renewal_period` and an
    /// immediate first pass.
    pub fn new(renewal_period: Duration) -> Self {
        Self {
            renewal_period,
            heartbeat_period: renewal_period / 10,
            run_on_start: true,
        }
    }

    /// Set the heartbeat interval.
    pub fn with_heartbeat(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    /// Set whether the first pass runs immediately.
    pub fn with_run_on_start(mut self, run_on_start: bool) -> Self {
        self.run_on_start = run_on_start;
        self
    }
}

impl From<&RenewerConfig> for ScheduleConfig {
    fn from(config: &RenewerConfig) -> Self {
        Self {
            renewal_period: config.renewal_period,
            heartbeat_period: config.heartbeat_period(),
            run_on_start: config.run_on_start,
        }
    }
}

/// Events emitted by the scheduler.
#[derive(Debug, Clone)]
pub enum RenewalEvent {
    /// A pass is starting.
    PassStarted {
        /// Pass number (1-based).
        pass: u64,
    },

    /// A pass finished.
    PassCompleted {
        /// Pass number (1-based).
        pass: u64,
        /// Batch aggregate.
        aggregate: RenewalAggregate,
        /// Certificates actually installed.
        installed: usize,
        /// Jobs that failed.
        failed: usize,
    },

    /// Periodic liveness signal.
    Heartbeat {
        /// Passes completed so far.
        passes: u64,
    },
}

/// Handler for scheduler events.
///
/// Implement this trait to receive notifications about renewal passes.
pub trait RenewalEventHandler: Send + Sync {
    /// Handle an event.
    fn handle_event(&self, event: RenewalEvent);
}

/// Runs renewal passes on a fixed period.
pub struct RenewalScheduler {
    orchestrator: RenewalOrchestrator,
    jobs: Vec<CertificateJob>,
    config: ScheduleConfig,
    passes: AtomicU64,
    event_handler: Option<Arc<dyn RenewalEventHandler>>,
}

impl RenewalScheduler {
    /// Create a scheduler renewing `jobs`.
    pub fn new(
        orchestrator: RenewalOrchestrator,
        jobs: Vec<CertificateJob>,
        config: ScheduleConfig,
    ) -> Self {
        Self {
            orchestrator,
            jobs,
            config,
            passes: AtomicU64::new(0),
            event_handler: None,
        }
    }

    /// Set the event handler.
    pub fn with_event_handler(mut self, handler: Arc<dyn RenewalEventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Number of completed passes.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Run until `cancel` fires.
    pub async fn run(&self, cancel: &CancellationToken) {
        let renewal_period = self.config.renewal_period.max(MIN_PERIOD);
        let heartbeat_period = self.config.heartbeat_period.max(MIN_PERIOD);
        info!(
            jobs = self.jobs.len(),
            renewal_period = %format_duration(renewal_period),
            heartbeat_period = %format_duration(heartbeat_period),
            "starting renewal scheduler"
        );

        let start = Instant::now();
        let first_pass = if self.config.run_on_start {
            start
        } else {
            start + renewal_period
        };

        let mut renewal = interval_at(first_pass, renewal_period);
        renewal.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut heartbeat = interval_at(start + heartbeat_period, heartbeat_period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = renewal.tick() => {
                    self.run_pass(cancel).await;
                }
                _ = heartbeat.tick() => {
                    let passes = self.passes();
                    info!(passes, "heartbeat ok");
                    self.emit_event(RenewalEvent::Heartbeat { passes });
                }
            }
        }

        info!(passes = self.passes(), "renewal scheduler stopped");
    }

    /// Run a single pass now.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> RenewalReport {
        let pass = self.passes() + 1;
        self.emit_event(RenewalEvent::PassStarted { pass });

        let report = self.orchestrator.run(&self.jobs, cancel).await;
        self.passes.fetch_add(1, Ordering::Relaxed);

        info!(
            pass,
            total = report.aggregate.total,
            success = report.aggregate.success,
            "renewal pass complete"
        );
        self.emit_event(RenewalEvent::PassCompleted {
            pass,
            aggregate: report.aggregate,
            installed: report.installed(),
            failed: report.failed(),
        });
        report
    }

    fn emit_event(&self, event: RenewalEvent) {
        if let Some(ref handler) = self.event_handler {
            handler.handle_event(event);
        }
    }
}
