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

//! Host service restarts.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{RenewError, Result};
use crate::util::cancellable;

/// Capability for restarting a host service by name.
#[async_trait]
pub trait ServiceRestarter: Send + Sync {
    /// Restart `service`.
    async fn restart(&self, service: &str, cancel: &CancellationToken) -> Result<()>;
}

/// Restarts services by running an external command with the service name
/// appended, `systemctl restart <service>` by default.
#[derive(Debug, Clone)]
pub struct SystemctlRestarter {
    program: String,
    args: Vec<String>,
}

impl Default for SystemctlRestarter {
    fn default() -> Self {
        Self {
            program: "systemctl".to_string(),
            args: vec!["restart".to_string()],
        }
    }
}

impl SystemctlRestarter {
    /// Build a restarter from a command line. The first element is the
    /// program, the rest are leading arguments.
    pub fn from_command(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| RenewError::config("restart command is empty"))?;

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    /// The program that is run.
    pub fn program(&self) -> &str {
        &self.program
    }

    async fn run(&self, service: &str) -> Result<()> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(service)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RenewError::restart(service, format!("could not run {}: {e}", self.program)))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = match stderr.trim() {
            "" => format!("{} exited with {}", self.program, output.status),
            text => format!("{} exited with {}: {text}", self.program, output.status),
        };
        Err(RenewError::restart(service, message))
    }
}

#[async_trait]
impl ServiceRestarter for SystemctlRestarter {
    async fn restart(&self, service: &str, cancel: &CancellationToken) -> Result<()> {
        debug!(service, program = %self.program, "running restart command");
        cancellable(cancel, self.run(service)).await
    }
}
