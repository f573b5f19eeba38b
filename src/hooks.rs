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

//! Post-issue hook scheduling.
//!
//! After a certificate is written each configured [`HookSpec`] runs in its
//! own task: it first sleeps until its daily window opens (see
//! [`wait_until_window`]), then runs the command with `sh -c`, inheriting
//! stdout and stderr. Failures are logged and never retried.
//!
//! # Detached execution
//!
//! [`HookRunner::run`] returns immediately with a [`HookBatch`]. The daemon
//! calls [`HookBatch::detach`]: the tasks keep running, are never
//! cancelled and report nothing back to the worker. One-shot issuance calls
//! [`HookBatch::wait`] instead so the process does not exit underneath
//! running hooks. Waiting tasks hold no resources beyond their timer; at
//! most `max_concurrent` commands execute at the same time.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::HookSpec;
use crate::error::HookError;

/// Default limit on concurrently executing hook commands.
pub const DEFAULT_MAX_CONCURRENT_HOOKS: usize = 8;

/// Time to wait before `hook` may run, given the local time `now`.
///
/// Rules are checked in order, against today's bounds:
///
/// - no window: run now
/// - before `run_after`: wait until today's `run_after`
/// - after `run_before`: wait until tomorrow's `run_after` (next midnight
///   if only `run_before` is set)
/// - otherwise: run now
///
/// Bounds are not wrapped around midnight. With `22:00`-`06:00` a hook at
/// 03:00 waits for 22:00 and one at 23:00 waits for 22:00 tomorrow.
pub fn wait_until_window(hook: &HookSpec, now: NaiveDateTime) -> Duration {
    let today = now.date();
    let start_today = hook.run_after.map(|s| today.and_time(s));
    let end_today = hook.run_before.map(|e| today.and_time(e));

    let target = match (start_today, end_today) {
        (Some(s), _) if now < s => Some(s),
        (_, Some(e)) if now > e => start_today
            .or_else(|| today.and_hms_opt(0, 0, 0))
            .map(|s| s + chrono::Duration::hours(24)),
        _ => None,
    };

    target
        .and_then(|t| (t - now).to_std().ok())
        .unwrap_or(Duration::ZERO)
}

/// Run `cmd` through `sh -c`, inheriting stdout and stderr.
pub async fn execute(cmd: &str) -> Result<(), HookError> {
    let status = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .status()
        .await?;

    if status.success() {
        Ok(())
    } else {
        Err(HookError::Failed(status))
    }
}

/// Spawns hook tasks, bounding how many commands execute at once.
#[derive(Debug, Clone)]
pub struct HookRunner {
    permits: Arc<Semaphore>,
}

impl Default for HookRunner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT_HOOKS)
    }
}

impl HookRunner {
    /// Create a runner allowing `max_concurrent` commands at once.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Spawn one task per hook and return without waiting.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run(&self, tenant: &str, hooks: &[HookSpec]) -> HookBatch {
        let handles = hooks
            .iter()
            .cloned()
            .map(|hook| {
                let tenant = tenant.to_string();
                let permits = Arc::clone(&self.permits);
                tokio::spawn(run_one(tenant, hook, permits))
            })
            .collect();

        HookBatch { handles }
    }
}

async fn run_one(tenant: String, hook: HookSpec, permits: Arc<Semaphore>) {
    let wait = wait_until_window(&hook, chrono::Local::now().naive_local());
    if !wait.is_zero() {
        info!(
            tenant = %tenant,
            "Hook '{}' will run in {} (outside time window)",
            hook.cmd,
            humantime::format_duration(Duration::from_secs(wait.as_secs()))
        );
        tokio::time::sleep(wait).await;
    }

    let _permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            warn!(tenant = %tenant, "Hook runner closed, skipping '{}'", hook.cmd);
            return;
        }
    };

    info!(tenant = %tenant, "Running hook: {}", hook.cmd);
    if let Err(e) = execute(&hook.cmd).await {
        error!(tenant = %tenant, "Hook failed: {}, error: {}", hook.cmd, e);
    }
}

/// Handles of the tasks spawned for one issuance.
#[derive(Debug)]
#[must_use = "call detach() or wait() on the batch"]
pub struct HookBatch {
    handles: Vec<JoinHandle<()>>,
}

impl HookBatch {
    /// Number of hooks spawned.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no hooks were spawned.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop tracking the tasks; they keep running to completion.
    pub fn detach(self) {
        drop(self.handles);
    }

    /// Wait for every hook to finish, including any window delay.
    pub async fn wait(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Hook task panicked: {}", e);
            }
        }
    }
}
