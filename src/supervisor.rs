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

//! Supervision of all tenant workers.
//!
//! The [`Supervisor`] is handed the full list of tenants up front and owns
//! it; there is no process-wide configuration state. It either runs one
//! [`Worker`] task per tenant until they all end ([`Supervisor::run`]), or
//! issues once for every tenant in turn ([`Supervisor::issue_all`]).

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::TenantConfig;
use crate::error::{ConfigError, Result};
use crate::hooks::HookRunner;
use crate::renewal::{self, RenewalDecision};
use crate::worker::Worker;

/// Starts and awaits tenant workers.
#[derive(Debug)]
pub struct Supervisor {
    configs: Vec<TenantConfig>,
    hooks: HookRunner,
}

impl Supervisor {
    /// Create a supervisor for `configs` with the default hook runner.
    pub fn new(configs: Vec<TenantConfig>) -> Self {
        Self {
            configs,
            hooks: HookRunner::default(),
        }
    }

    /// Use a specific hook runner, shared by all workers.
    pub fn with_hook_runner(mut self, hooks: HookRunner) -> Self {
        self.hooks = hooks;
        self
    }

    /// Tenant configurations under supervision.
    pub fn configs(&self) -> &[TenantConfig] {
        &self.configs
    }

    /// Run one worker per tenant concurrently and wait for all of them.
    ///
    /// Workers loop forever, so under normal operation this only returns if
    /// the future is dropped (which aborts every worker). A worker that
    /// panics is restarted after the tenant's check interval.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NoTenants`] when there is nothing to supervise.
    pub async fn run(self) -> Result<()> {
        if self.configs.is_empty() {
            return Err(ConfigError::NoTenants.into());
        }

        info!("Starting {} worker(s)", self.configs.len());
        let mut workers = JoinSet::new();
        for config in self.configs {
            let tenant = config.name.clone();
            let backoff = config.daemon.check_interval();
            let hooks = self.hooks.clone();
            workers.spawn(keep_alive(tenant, backoff, move || {
                Worker::new(config.clone(), hooks.clone()).run()
            }));
        }

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!("Worker task ended abnormally: {}", e);
            }
        }

        info!("All workers stopped");
        Ok(())
    }

    /// Issue once for every tenant, in order, waiting for each tenant's
    /// hooks before moving on.
    ///
    /// Stops at the first tenant that fails and returns its error.
    pub async fn issue_all(&self) -> Result<()> {
        for config in &self.configs {
            let worker = Worker::new(config.clone(), self.hooks.clone());
            let (issued, hooks) = worker.issue_once().await.map_err(|e| {
                error!(tenant = %config.name, "Error issuing certificate: {}", e);
                e
            })?;

            if !issued.failed_writes.is_empty() {
                error!(
                    tenant = %config.name,
                    "{} file(s) could not be written",
                    issued.failed_writes.len()
                );
            }
            hooks.wait().await;
        }

        Ok(())
    }

    /// Current renewal decision for every tenant.
    pub async fn status(&self) -> Vec<(String, RenewalDecision)> {
        let mut out = Vec::with_capacity(self.configs.len());
        for config in &self.configs {
            let decision = renewal::check(&config.output.dir, config.daemon.renew_before()).await;
            out.push((config.name.clone(), decision));
        }
        out
    }
}

/// Run the task built by `start`, starting a fresh one after each panic.
///
/// Returns once a task finishes or is cancelled. Dropping the returned
/// future aborts the running task.
async fn keep_alive<F, Fut>(tenant: String, backoff: Duration, mut start: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        let mut task = JoinSet::new();
        task.spawn(start());

        match task.join_next().await {
            Some(Err(e)) if e.is_panic() => {
                error!(
                    tenant = %tenant,
                    "Worker panicked, restarting in {}: {}",
                    humantime::format_duration(backoff),
                    e
                );
                tokio::time::sleep(backoff).await;
            }
            Some(Err(e)) => {
                error!(tenant = %tenant, "Worker task ended abnormally: {}", e);
                return;
            }
            Some(Ok(())) | None => {
                info!(tenant = %tenant, "Worker stopped");
                return;
            }
        }
    }
}
