// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Batch job commands
//!
//! Commands: run

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use fleet_batch::{BatchReport, BatchSession, BatchStatus};
use fleet_core::domain::agent::AgentId;
use fleet_core::domain::batch_options::{BatchOptions, BatchSpec};
use fleet_core::domain::fleet_config::FleetConfigManifest;
use fleet_core::infrastructure::{InMemoryEventBus, SimulatedFleet, TimestampJobIdGenerator};

#[derive(Subcommand)]
pub enum BatchCommand {
    /// Run a job across the fleet in waves
    ///
    /// Agents come from `spec.fleet` of the configuration file.
    Run {
        /// Target expression
        #[arg(value_name = "TARGET")]
        tgt: String,

        /// Function to run on each agent
        #[arg(value_name = "FUNCTION")]
        fun: String,

        /// Function argument (JSON, or a plain string); repeatable
        #[arg(short, long = "arg", value_name = "ARG")]
        args: Vec<String>,

        /// Target expression type
        #[arg(long, default_value = "glob")]
        tgt_type: String,

        /// Wave size: an agent count ("10") or a share of live agents ("25%")
        #[arg(short, long, value_name = "SIZE")]
        batch: Option<String>,

        /// Metadata attached to the start and done events (KEY=VALUE); repeatable
        #[arg(short, long = "metadata", value_name = "KEY=VALUE")]
        metadata: Vec<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: BatchCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        BatchCommand::Run {
            tgt,
            fun,
            args,
            tgt_type,
            batch,
            metadata,
            json,
        } => {
            let config = FleetConfigManifest::load_or_default(config_override)
                .context("Failed to load configuration")?;
            config.validate().context("Configuration validation failed")?;

            let mut options = BatchOptions::new(tgt, fun)
                .with_tuning(config.spec.batch.clone())
                .with_arg(args.iter().map(|a| parse_arg(a)).collect())
                .with_metadata(parse_metadata(&metadata)?);
            options.tgt_type = tgt_type;
            if let Some(batch) = batch {
                options = options.with_batch(BatchSpec::Text(batch));
            }

            let report = run(options, &config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            if !report.is_complete() {
                std::process::exit(130);
            }
            Ok(())
        }
    }
}

async fn run(options: BatchOptions, config: &FleetConfigManifest) -> Result<BatchReport> {
    if config.spec.fleet.is_empty() {
        anyhow::bail!("No agents configured under spec.fleet; nothing to dispatch to");
    }

    let bus = Arc::new(InMemoryEventBus::with_default_capacity());
    let fleet = SimulatedFleet::new(config.spec.fleet.clone(), bus.clone());
    let session = BatchSession::new(
        options,
        Arc::new(fleet),
        bus,
        Arc::new(TimestampJobIdGenerator::new()),
    )?;

    println!(
        "Running batch {} ({} agents configured)...",
        session.batch_jid().to_string().bold(),
        config.spec.fleet.len()
    );

    let cancel = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; cancelling batch");
            cancel.cancel();
        }
    });

    let report = session.run().await.context("Batch failed")?;
    info!(batch_jid = %report.batch_jid, status = ?report.status, "Batch finished");
    Ok(report)
}

/// JSON when it parses, otherwise the raw string.
fn parse_arg(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn parse_metadata(pairs: &[String]) -> Result<HashMap<String, serde_json::Value>> {
    pairs
        .iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("Invalid metadata '{}': expected KEY=VALUE", pair))?;
            Ok((key.to_string(), parse_arg(value)))
        })
        .collect()
}

fn print_report(report: &BatchReport) {
    let status = match report.status {
        BatchStatus::Completed => "completed".green(),
        BatchStatus::Cancelled => "cancelled".yellow(),
    };
    println!();
    println!("Batch {} {}", report.batch_jid, status);
    println!("  Batch size: {}", report.batch_size);
    println!("  Targeted:   {}", report.targeted_agents.len());
    print_agents("Done", &report.done_agents, |s| s.green().to_string());
    print_agents("Timed out", &report.timedout_agents, |s| s.red().to_string());
    print_agents("Down", &report.down_agents, |s| s.dimmed().to_string());
    if !report.active_agents.is_empty() {
        print_agents("Running", &report.active_agents, |s| s.yellow().to_string());
    }
}

fn print_agents(label: &str, agents: &BTreeSet<AgentId>, paint: impl Fn(&str) -> String) {
    let names: Vec<String> = agents.iter().map(|a| paint(a.as_str())).collect();
    if names.is_empty() {
        println!("  {:<11} {}", format!("{}:", label), "-".dimmed());
    } else {
        println!("  {:<11} {} ({})", format!("{}:", label), names.join(", "), agents.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_arg_prefers_json() {
        assert_eq!(parse_arg("42"), json!(42));
        assert_eq!(parse_arg("{\"refresh\": true}"), json!({"refresh": true}));
        assert_eq!(parse_arg("nginx"), json!("nginx"));
    }

    #[test]
    fn test_parse_metadata() {
        let metadata = parse_metadata(&["ticket=OPS-42".to_string(), "retries=3".to_string()]).unwrap();
        assert_eq!(metadata["ticket"], json!("OPS-42"));
        assert_eq!(metadata["retries"], json!(3));

        assert!(parse_metadata(&["no-separator".to_string()]).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_against_configured_fleet() {
        let config = FleetConfigManifest::from_yaml_str(
            r#"
apiVersion: fleet.dev/v1
kind: FleetConfig
metadata:
  name: test
spec:
  batch:
    batch: 1
    timeout: 5s
    gather_job_timeout: 3s
    batch_delay: 1s
  fleet:
    - id: web-1
    - id: web-2
      responsive: false
"#,
        )
        .unwrap();
        let options = BatchOptions::new("web-*", "pkg.install").with_tuning(config.spec.batch.clone());

        let report = run(options, &config).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.done_agents, [AgentId::from("web-1")].into_iter().collect());
        assert_eq!(report.down_agents, [AgentId::from("web-2")].into_iter().collect());
    }

    #[tokio::test]
    async fn test_run_requires_agents() {
        let config = FleetConfigManifest::default();
        let options = BatchOptions::new("*", "test.version");
        assert!(run(options, &config).await.is_err());
    }
}
