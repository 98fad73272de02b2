// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Batch Options
//!
//! Configuration consumed by a batch session: what to run, where, how many
//! agents per wave, and the timeouts bounding discovery and liveness polling.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BatchSizeError {
    #[error("Invalid batch size '{0}': expected a non-negative integer or a percentage such as '10%'")]
    Malformed(String),
}

/// Wave capacity as written in configuration: `4`, `"4"` or `"25%"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchSpec {
    Count(u64),
    Text(String),
}

impl BatchSpec {
    pub fn parse(&self) -> Result<BatchSize, BatchSizeError> {
        match self {
            Self::Count(n) => Ok(BatchSize::Count(*n as usize)),
            Self::Text(raw) => raw.parse(),
        }
    }
}

impl Default for BatchSpec {
    fn default() -> Self {
        Self::Text("10%".to_string())
    }
}

impl fmt::Display for BatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Parsed wave capacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatchSize {
    Count(usize),
    /// Percentage of the live fleet, rounded up.
    Percent(f64),
}

impl BatchSize {
    /// Resolve against the number of live agents. Never returns less than 1.
    pub fn resolve(&self, live: usize) -> usize {
        let size = match *self {
            Self::Count(n) => n,
            Self::Percent(p) => (live as f64 * p / 100.0).ceil() as usize,
        };
        size.max(1)
    }
}

impl std::str::FromStr for BatchSize {
    type Err = BatchSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(pct) = trimmed.strip_suffix('%') {
            return match pct.trim().parse::<f64>() {
                Ok(p) if p.is_finite() && p >= 0.0 => Ok(Self::Percent(p)),
                _ => Err(BatchSizeError::Malformed(s.to_string())),
            };
        }
        trimmed
            .parse::<usize>()
            .map(Self::Count)
            .map_err(|_| BatchSizeError::Malformed(s.to_string()))
    }
}

/// Tuning knobs shared by every batch run; the `spec.batch` section of the
/// fleet configuration manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTuning {
    /// Wave capacity
    #[serde(default)]
    pub batch: BatchSpec,

    /// Delay between dispatching a wave and its first liveness poll
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Liveness poll delay; also bounds discovery when no presence timeout is set
    #[serde(default = "default_gather_job_timeout", with = "humantime_serde")]
    pub gather_job_timeout: Duration,

    /// Discovery deadline
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub presence_ping_timeout: Option<Duration>,

    /// Window for coalescing completions before advancing to the next wave
    #[serde(default = "default_batch_delay", with = "humantime_serde")]
    pub batch_delay: Duration,
}

impl Default for BatchTuning {
    fn default() -> Self {
        Self {
            batch: BatchSpec::default(),
            timeout: default_timeout(),
            gather_job_timeout: default_gather_job_timeout(),
            presence_ping_timeout: None,
            batch_delay: default_batch_delay(),
        }
    }
}

impl BatchTuning {
    /// How long presence discovery may run before batching starts regardless.
    pub fn discovery_timeout(&self) -> Duration {
        self.presence_ping_timeout.unwrap_or(self.gather_job_timeout)
    }
}

/// Everything a batch session needs to know about the job it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Target expression, passed opaquely to the transport
    pub tgt: String,

    #[serde(default = "default_tgt_type")]
    pub tgt_type: String,

    /// Function to run on every agent
    pub fun: String,

    #[serde(default)]
    pub arg: Vec<serde_json::Value>,

    #[serde(flatten)]
    pub tuning: BatchTuning,

    /// Attached unchanged to the start/done lifecycle events
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl BatchOptions {
    pub fn new(tgt: impl Into<String>, fun: impl Into<String>) -> Self {
        Self {
            tgt: tgt.into(),
            tgt_type: default_tgt_type(),
            fun: fun.into(),
            arg: Vec::new(),
            tuning: BatchTuning::default(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_tuning(mut self, tuning: BatchTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_batch(mut self, batch: BatchSpec) -> Self {
        self.tuning.batch = batch;
        self
    }

    pub fn with_arg(mut self, arg: Vec<serde_json::Value>) -> Self {
        self.arg = arg;
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

fn default_tgt_type() -> String {
    "glob".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_gather_job_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_batch_delay() -> Duration {
    Duration::from_secs(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_batch_size() {
        assert_eq!("2".parse::<BatchSize>().unwrap(), BatchSize::Count(2));
        assert_eq!("25%".parse::<BatchSize>().unwrap(), BatchSize::Percent(25.0));
        assert_eq!(" 12.5 % ".parse::<BatchSize>().unwrap(), BatchSize::Percent(12.5));
        assert!("two".parse::<BatchSize>().is_err());
        assert!("-1".parse::<BatchSize>().is_err());
        assert!("-5%".parse::<BatchSize>().is_err());
        assert!("%".parse::<BatchSize>().is_err());
        assert!("NaN%".parse::<BatchSize>().is_err());
    }

    #[test]
    fn test_resolve_never_below_one() {
        assert_eq!(BatchSize::Count(0).resolve(10), 1);
        assert_eq!(BatchSize::Count(3).resolve(0), 3);
        assert_eq!(BatchSize::Percent(0.0).resolve(10), 1);
        assert_eq!(BatchSize::Percent(10.0).resolve(0), 1);
        assert_eq!(BatchSize::Percent(1.0).resolve(3), 1);
    }

    #[test]
    fn test_resolve_percent_rounds_up() {
        assert_eq!(BatchSize::Percent(10.0).resolve(11), 2);
        assert_eq!(BatchSize::Percent(50.0).resolve(3), 2);
        assert_eq!(BatchSize::Percent(100.0).resolve(7), 7);
        // Exact products must not pick up an extra agent
        assert_eq!(BatchSize::Percent(7.0).resolve(100), 7);
        assert_eq!(BatchSize::Percent(14.0).resolve(50), 7);
        assert_eq!(BatchSize::Percent(29.0).resolve(100), 29);
    }

    #[test]
    fn test_batch_spec_from_yaml() {
        let count: BatchSpec = serde_yaml::from_str("4").unwrap();
        assert_eq!(count.parse().unwrap(), BatchSize::Count(4));
        let pct: BatchSpec = serde_yaml::from_str("\"30%\"").unwrap();
        assert_eq!(pct.parse().unwrap(), BatchSize::Percent(30.0));
    }

    #[test]
    fn test_discovery_timeout_falls_back_to_gather_job_timeout() {
        let mut tuning = BatchTuning::default();
        assert_eq!(tuning.discovery_timeout(), Duration::from_secs(10));
        tuning.presence_ping_timeout = Some(Duration::from_secs(2));
        assert_eq!(tuning.discovery_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_options_deserialize_with_flattened_tuning() {
        let options: BatchOptions = serde_json::from_value(serde_json::json!({
            "tgt": "web*",
            "fun": "pkg.upgrade",
            "batch": "50%",
            "timeout": "3s",
            "presence_ping_timeout": "1s",
            "metadata": {"ticket": "OPS-1"}
        }))
        .unwrap();
        assert_eq!(options.tgt_type, "glob");
        assert_eq!(options.tuning.batch, BatchSpec::Text("50%".to_string()));
        assert_eq!(options.tuning.timeout, Duration::from_secs(3));
        assert_eq!(options.tuning.gather_job_timeout, Duration::from_secs(10));
        assert_eq!(options.tuning.discovery_timeout(), Duration::from_secs(1));
        assert_eq!(options.metadata["ticket"], "OPS-1");
    }
}
