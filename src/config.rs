//! Daemon configuration.
//!
//! Loaded from TOML, typically `/etc/scriptwarden/scriptwarden.toml`. Every
//! section and field has a default, so a missing or partial file still yields
//! a runnable configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "SCRIPTWARDEN_CONFIG";

/// Default config file location on the host.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/scriptwarden/scriptwarden.toml";

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WardenConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP API binds to.
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
        }
    }
}

/// Duration bounds and housekeeping intervals for the execution registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Smallest accepted requested duration.
    #[serde(default = "default_min_duration_ms")]
    pub min_duration_ms: u64,
    /// Largest accepted requested duration.
    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: u64,
    /// Margin past the requested duration before a silent execution is
    /// presumed complete.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
    /// How long terminal records stay visible before the sweeper drops them.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// How often the background sweeper runs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_duration_ms: default_min_duration_ms(),
            max_duration_ms: default_max_duration_ms(),
            grace_ms: default_grace_ms(),
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Which script executor the daemon drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorKind {
    /// Run scripts as local interpreter child processes.
    #[serde(rename = "process")]
    Process,
    /// Forward scripts to a remote execution bridge over HTTP.
    #[serde(rename = "bridge")]
    Bridge,
    /// No executor; every start request is rejected as unavailable.
    #[serde(rename = "none")]
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_executor_kind")]
    pub kind: ExecutorKind,
    #[serde(default)]
    pub process: ProcessExecutorConfig,
    #[serde(default)]
    pub bridge: BridgeExecutorConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            kind: default_executor_kind(),
            process: ProcessExecutorConfig::default(),
            bridge: BridgeExecutorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessExecutorConfig {
    /// Interpreter binary; looked up on PATH unless absolute.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Arguments placed before the script body.
    #[serde(default = "default_interpreter_args")]
    pub args: Vec<String>,
}

impl Default for ProcessExecutorConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            args: default_interpreter_args(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeExecutorConfig {
    /// Base URL of the execution bridge, e.g. `http://10.0.0.5:9200`.
    #[serde(default)]
    pub endpoint: String,
    /// Timeout for dispatch and cancel calls. The outcome poll computes its
    /// own, longer timeout from the execution's duration.
    #[serde(default = "default_bridge_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BridgeExecutorConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            request_timeout_secs: default_bridge_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter; `RUST_LOG` still wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen_address() -> String {
    "127.0.0.1:7410".to_string()
}

fn default_min_duration_ms() -> u64 {
    1000
}

fn default_max_duration_ms() -> u64 {
    60_000
}

fn default_grace_ms() -> u64 {
    1000
}

fn default_retention_secs() -> u64 {
    300
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_executor_kind() -> ExecutorKind {
    ExecutorKind::Process
}

fn default_interpreter() -> String {
    "node".to_string()
}

fn default_interpreter_args() -> Vec<String> {
    vec!["-e".to_string()]
}

fn default_bridge_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl WardenConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: WardenConfig = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load from `$SCRIPTWARDEN_CONFIG`, then the default path, then fall
    /// back to built-in defaults. A file that exists but fails to parse is
    /// reported and skipped rather than taking the daemon down.
    pub fn load_or_default() -> Self {
        let candidates = [
            std::env::var(CONFIG_ENV_VAR).ok(),
            Some(DEFAULT_CONFIG_PATH.to_string()),
        ];

        for candidate in candidates.into_iter().flatten() {
            let path = Path::new(&candidate);
            if !path.exists() {
                continue;
            }
            match Self::load(path) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded configuration");
                    return config;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                }
            }
        }

        debug!("using built-in default configuration");
        Self::default()
    }
}
