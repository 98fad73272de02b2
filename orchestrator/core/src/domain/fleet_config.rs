// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Fleet Configuration Types
//
// Defines the configuration schema for a fleet orchestrator host, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Batch tuning defaults (wave size, liveness and discovery timeouts)
// - An optional simulated fleet used by `fleet batch run`

use crate::domain::batch_options::{BatchSpec, BatchTuning};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "fleet.dev/v1";
pub const KIND: &str = "FleetConfig";

/// Top-level Kubernetes-style fleet configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfigManifest {
    /// API version (must be "fleet.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "FleetConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: FleetConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfigSpec {
    /// Batch tuning defaults
    #[serde(default)]
    pub batch: BatchTuning,

    /// Simulated agents (development and demos only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fleet: Vec<SimulatedAgentConfig>,
}

/// Behaviour of one simulated agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedAgentConfig {
    pub id: String,

    /// Answers presence pings
    #[serde(default = "default_true")]
    pub responsive: bool,

    /// Delay before answering a ping
    #[serde(default = "default_ping_delay", with = "humantime_serde")]
    pub ping_delay: Duration,

    /// How long the dispatched job runs
    #[serde(default = "default_job_duration", with = "humantime_serde")]
    pub job_duration: Duration,

    /// Goes silent after receiving the job (no return, no liveness answers)
    #[serde(default)]
    pub hangs: bool,
}

impl SimulatedAgentConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            responsive: true,
            ping_delay: default_ping_delay(),
            job_duration: default_job_duration(),
            hangs: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ping_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_job_duration() -> Duration {
    Duration::from_secs(2)
}

impl Default for FleetConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "fleet-orchestrator".to_string(),
                version: None,
                labels: None,
            },
            spec: FleetConfigSpec::default(),
        }
    }
}

impl FleetConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. FLEET_CONFIG_PATH environment variable
    /// 2. ./fleet-config.yaml (working directory)
    /// 3. ~/.fleet/config.yaml (user home)
    /// 4. /etc/fleet/config.yaml (system, Unix) or C:\ProgramData\Fleet\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("FLEET_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./fleet-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".fleet").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/fleet/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Fleet\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails hard if missing/invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("FLEET_BATCH_SIZE") {
            let spec = match val.trim().parse::<u64>() {
                Ok(n) => BatchSpec::Count(n),
                Err(_) => BatchSpec::Text(val.trim().to_string()),
            };
            match spec.parse() {
                Ok(_) => {
                    tracing::info!("Environment override: FLEET_BATCH_SIZE={}", spec);
                    self.spec.batch.batch = spec;
                }
                Err(e) => {
                    tracing::warn!("Invalid value for FLEET_BATCH_SIZE: {}. Ignoring.", e);
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        self.spec
            .batch
            .batch
            .parse()
            .map_err(|e| anyhow::anyhow!("spec.batch.batch: {}", e))?;

        if self.spec.batch.gather_job_timeout.is_zero() {
            anyhow::bail!("spec.batch.gather_job_timeout must be greater than zero");
        }

        let mut seen = HashSet::new();
        for agent in &self.spec.fleet {
            if agent.id.is_empty() {
                anyhow::bail!("spec.fleet entries must have a non-empty id");
            }
            if agent.id.contains('/') {
                anyhow::bail!("Simulated agent id '{}' must not contain '/'", agent.id);
            }
            if !seen.insert(agent.id.as_str()) {
                anyhow::bail!("Duplicate simulated agent id: {}", agent.id);
            }
        }

        Ok(())
    }
}
