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

//! Per-tenant renewal worker.
//!
//! A [`Worker`] owns one [`TenantConfig`] for the life of the process. On
//! every tick it reads the tenant's metadata, and when renewal is due it
//! authenticates, issues and schedules the post-issue hooks. Any failure is
//! logged with the tenant name and retried on the next tick only.

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::auth::authenticate;
use crate::config::TenantConfig;
use crate::error::Result;
use crate::hooks::{HookBatch, HookRunner};
use crate::issuer::{issue, Issued};
use crate::renewal::{self, RenewalDecision};

/// What a single tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// The certificate is still valid; nothing was requested.
    Skipped(RenewalDecision),

    /// A new certificate was issued and hooks were scheduled.
    Issued(Issued),

    /// Renewal was due but the attempt failed.
    Failed(crate::error::AgentError),
}

/// Renewal loop for one tenant.
#[derive(Debug, Clone)]
pub struct Worker {
    config: TenantConfig,
    hooks: HookRunner,
}

impl Worker {
    /// Create a worker for `config`, spawning hooks through `hooks`.
    pub fn new(config: TenantConfig, hooks: HookRunner) -> Self {
        Self { config, hooks }
    }

    /// Tenant configuration.
    pub fn config(&self) -> &TenantConfig {
        &self.config
    }

    /// Tenant name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Authenticate, issue and spawn hooks once, regardless of expiration.
    ///
    /// Hooks only run when issuance succeeded.
    pub async fn issue_once(&self) -> Result<(Issued, HookBatch)> {
        let session = authenticate(&self.config.vault).await?;
        let issued = issue(&session, &self.config).await?;
        let batch = self.hooks.run(&self.config.name, &self.config.hooks.post_issue);
        Ok((issued, batch))
    }

    /// Evaluate the renewal decision and issue if it is due.
    ///
    /// Hooks spawned by a successful issuance are detached.
    pub async fn tick(&self) -> TickOutcome {
        let decision =
            renewal::check(&self.config.output.dir, self.config.daemon.renew_before()).await;

        if !decision.needs_renewal() {
            debug!(tenant = %self.config.name, "{}", decision);
            return TickOutcome::Skipped(decision);
        }

        info!(tenant = %self.config.name, "{}, issuing...", decision);
        match self.issue_once().await {
            Ok((issued, hooks)) => {
                if !hooks.is_empty() {
                    debug!(tenant = %self.config.name, "Scheduled {} hook(s)", hooks.len());
                }
                hooks.detach();
                TickOutcome::Issued(issued)
            }
            Err(e) => {
                error!(tenant = %self.config.name, "Error issuing certificate: {}", e);
                TickOutcome::Failed(e)
            }
        }
    }

    /// Tick forever at the configured check interval.
    ///
    /// The first tick happens immediately. A slow tick delays the next one
    /// rather than triggering a burst.
    pub async fn run(self) {
        let period = self.config.daemon.check_interval();
        info!(
            tenant = %self.config.name,
            "Worker started, checking every {}",
            humantime::format_duration(period)
        );

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }
}
