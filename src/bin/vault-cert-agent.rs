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

//! Vault certificate agent command-line tool.
//!
//! # Usage
//!
//! ```text
//! vault-cert-agent [OPTIONS] <COMMAND>
//!
//! Commands:
//!   issue   Issue a certificate for every tenant now, then exit
//!   daemon  Keep every tenant's certificate renewed until interrupted
//!   status  Show the renewal state of every tenant
//!
//! Options:
//!   -c, --config <PATH>      Path to a single configuration file
//!   -d, --config-dir <DIR>   Directory of configuration files, one per tenant
//!   -v, --verbose            Enable debug logging
//!   -q, --quiet              Only log warnings and errors
//!       --log-json           Log one JSON object per event
//!   -h, --help               Print help
//!   -V, --version            Print version
//! ```
//!
//! # Examples
//!
//! ```bash
//! # Bootstrap certificates for every tenant
//! vault-cert-agent issue --config-dir /etc/vault-cert-agent/conf.d
//!
//! # Run as a service
//! VAULT_AUTH_SECRET_ID=... vault-cert-agent daemon -d /etc/vault-cert-agent/conf.d
//!
//! # Check one tenant
//! vault-cert-agent status --config ./web.yaml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use vault_cert_agent::logging::{self, LogConfig, LogLevel};
use vault_cert_agent::{ConfigLoader, Supervisor, TenantConfig};

/// Vault certificate agent
#[derive(Parser)]
#[command(name = "vault-cert-agent")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Issue and renew certificates from a Vault PKI secrets engine", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a single configuration file
    #[arg(short, long, global = true, value_name = "PATH", conflicts_with = "config_dir")]
    config: Option<PathBuf>,

    /// Directory of configuration files, one per tenant
    #[arg(short = 'd', long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log one JSON object per event
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue a certificate for every tenant now, then exit
    Issue,

    /// Keep every tenant's certificate renewed until interrupted
    Daemon,

    /// Show the renewal state of every tenant
    Status,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.quiet {
        LogLevel::Warn
    } else if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let mut log_config = LogConfig::default().with_level(level);
    if cli.log_json {
        log_config = log_config.with_json();
    }
    if let Err(e) = logging::init(&log_config) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_command(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_command(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let configs = load_configs(&cli)?;
    let supervisor = Supervisor::new(configs);

    match cli.command {
        Commands::Issue => cmd_issue(&supervisor).await,
        Commands::Daemon => cmd_daemon(supervisor).await,
        Commands::Status => cmd_status(&supervisor).await,
    }
}

fn load_configs(cli: &Cli) -> Result<Vec<TenantConfig>, Box<dyn std::error::Error>> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    if let Some(dir) = &cli.config_dir {
        loader = loader.with_dir(dir);
    }
    Ok(loader.load()?)
}

async fn cmd_issue(supervisor: &Supervisor) -> Result<(), Box<dyn std::error::Error>> {
    supervisor.issue_all().await?;
    tracing::info!("Issued certificates for {} tenant(s)", supervisor.configs().len());
    Ok(())
}

async fn cmd_daemon(supervisor: Supervisor) -> Result<(), Box<dyn std::error::Error>> {
    tokio::select! {
        result = supervisor.run() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Interrupted, shutting down");
        }
    }
    Ok(())
}

async fn cmd_status(supervisor: &Supervisor) -> Result<(), Box<dyn std::error::Error>> {
    let status = supervisor.status().await;
    let width = status.iter().map(|(name, _)| name.len()).max().unwrap_or(0);

    for (name, decision) in &status {
        let marker = if decision.needs_renewal() { "!" } else { " " };
        println!("{} {:<width$}  {}", marker, name, decision, width = width);
    }
    Ok(())
}
