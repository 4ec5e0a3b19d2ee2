//! Configuration loading and discovery
//!
//! Discovery hierarchy, first match wins:
//! 1. Current directory: ./agent-forge.toml or ./.agent-forge/config.toml
//! 2. User config: ~/.agent-forge/config.toml
//! 3. System config: /etc/agent-forge/config.toml
//! 4. Built-in defaults

use crate::env;
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::env as std_env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("could not determine home directory")]
    NoHomeDir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub analysis_capacity: usize,
    /// Unset keeps analyses until explicitly invalidated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_ttl_secs: Option<u64>,
    pub memo_capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memo_ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            analysis_capacity: 1000,
            analysis_ttl_secs: None,
            memo_capacity: 256,
            memo_ttl_secs: Some(300),
        }
    }
}

impl CacheConfig {
    pub fn analysis_ttl(&self) -> Option<Duration> {
        self.analysis_ttl_secs.map(Duration::from_secs)
    }

    pub fn memo_ttl(&self) -> Option<Duration> {
        self.memo_ttl_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_timeout_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter: 0.1,
            attempt_timeout_ms: None,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::new(self.max_retries, Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_jitter(self.jitter);
        policy.multiplier = self.multiplier;
        if let Some(ms) = self.attempt_timeout_ms {
            policy = policy.with_attempt_timeout(Duration::from_millis(ms));
        }
        policy
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Requirements above this priority (or flagged critical) are synthesized
    pub synthesis_priority_threshold: u8,
    pub task_timeout_secs: u64,
    /// Applied to templates that do not set their own limit
    pub max_concurrent_tasks: u32,
    /// Assignment reports kept in memory
    pub history_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            synthesis_priority_threshold: 50,
            task_timeout_secs: 300,
            max_concurrent_tasks: 1,
            history_limit: 1000,
        }
    }
}

impl OrchestratorConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub command_timeout_secs: u64,
    pub http_timeout_secs: u64,
    /// Safety findings at or above this severity refuse execution
    pub block_severity: u8,
    pub program_cache_ttl_secs: u64,
    /// Execution history entries kept; statistics still count every call
    pub history_limit: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 60,
            http_timeout_secs: 30,
            block_severity: 90,
            program_cache_ttl_secs: 300,
            history_limit: 1000,
        }
    }
}

impl ExecutorConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn program_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.program_cache_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: env::DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub orchestrator: OrchestratorConfig,
    pub executor: ExecutorConfig,
    pub logging: LoggingConfig,
}

impl ForgeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        fs::write(path, self.to_toml_string()?).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// State of one discovery candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateStatus {
    Found,
    NotAFile,
    Missing,
}

/// Configuration discovery rooted at a working directory and a home directory
#[derive(Debug, Clone)]
pub struct ConfigDiscovery {
    current_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
    include_system: bool,
}

impl ConfigDiscovery {
    pub fn new(current_dir: Option<PathBuf>, home_dir: Option<PathBuf>) -> Self {
        Self {
            current_dir,
            home_dir,
            include_system: true,
        }
    }

    /// Roots taken from the process environment
    pub fn from_environment() -> Self {
        Self::new(std_env::current_dir().ok(), Self::home_dir())
    }

    pub fn without_system_config(mut self) -> Self {
        self.include_system = false;
        self
    }

    fn home_dir() -> Option<PathBuf> {
        std_env::var("HOME")
            .ok()
            .or_else(|| std_env::var("USERPROFILE").ok())
            .map(PathBuf::from)
    }

    /// Configuration file candidates in priority order
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Some(current_dir) = &self.current_dir {
            candidates.push(env::local_standalone_config_path(current_dir));
            candidates.push(env::local_config_file_path(current_dir));
        }

        if let Some(home_dir) = &self.home_dir {
            candidates.push(env::user_config_file_path(home_dir));
        }

        #[cfg(unix)]
        if self.include_system {
            candidates.push(Path::new(env::SYSTEM_CONFIG_DIR).join(env::CONFIG_FILE_NAME));
        }

        candidates
    }

    pub fn find_config_file(&self) -> Option<PathBuf> {
        for candidate in self.candidates() {
            debug!("Checking for config file: {:?}", candidate);
            if candidate.is_file() {
                debug!("Found config file: {:?}", candidate);
                return Some(candidate);
            }
        }

        debug!("No config file found in discovery hierarchy");
        None
    }

    /// Load the first config file found, or defaults
    pub fn discover_config(&self) -> Result<(ForgeConfig, Option<PathBuf>), ConfigError> {
        if let Some(config_path) = self.find_config_file() {
            info!("Loading configuration from: {:?}", config_path);
            let config = ForgeConfig::from_toml_file(&config_path)?;
            return Ok((config, Some(config_path)));
        }

        info!("No configuration file found, using defaults");
        Ok((ForgeConfig::default(), None))
    }

    /// Every candidate with its current state, for diagnostics
    pub fn report(&self) -> Vec<(PathBuf, CandidateStatus)> {
        self.candidates()
            .into_iter()
            .map(|candidate| {
                let status = if candidate.is_file() {
                    CandidateStatus::Found
                } else if candidate.exists() {
                    CandidateStatus::NotAFile
                } else {
                    CandidateStatus::Missing
                };
                (candidate, status)
            })
            .collect()
    }

    /// Write a default config into the user's home directory unless one exists
    pub fn create_default_user_config(&self) -> Result<PathBuf, ConfigError> {
        let home_dir = self.home_dir.as_ref().ok_or(ConfigError::NoHomeDir)?;

        let config_dir = env::user_config_dir_path(home_dir);
        let config_path = env::user_config_file_path(home_dir);

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).map_err(|source| ConfigError::Io {
                path: config_dir.clone(),
                source,
            })?;
            info!("Created configuration directory: {:?}", config_dir);
        }

        if !config_path.exists() {
            ForgeConfig::default().to_toml_file(&config_path)?;
            info!("Created default configuration file: {:?}", config_path);
        } else {
            warn!("Configuration file already exists: {:?}", config_path);
        }

        Ok(config_path)
    }
}
