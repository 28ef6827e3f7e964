//! # Configuration Module
//!
//! Application configuration comes from a YAML file; the coroutine stack size can also
//! be tuned through the environment.
//!
//! ```yaml
//! server:
//!   host: 0.0.0.0
//!   port: 9501
//! runtime:
//!   stack_size: 0x10000
//! isolated:
//!   timeout_ms: 5000
//! context:
//!   site_name: zeal
//! ```
//!
//! ## Environment Variables
//!
//! ### `ZEAL_STACK_SIZE`
//!
//! Stack size for coroutines spawned by the framework. Accepts decimal (`65536`) or
//! hexadecimal (`0x10000`). A `runtime.stack_size` in the YAML file takes precedence.
//!
//! Default: `0x10000` (64 KB)

use anyhow::Context as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const STACK_SIZE_ENV: &str = "ZEAL_STACK_SIZE";
pub const DEFAULT_STACK_SIZE: usize = 0x10000;
pub const DEFAULT_ISOLATED_TIMEOUT_MS: u64 = 30_000;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes (default: 64 KB / 0x10000)
    pub stack_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let stack_size = env::var(STACK_SIZE_ENV)
            .ok()
            .and_then(|v| parse_stack_size(&v))
            .unwrap_or(DEFAULT_STACK_SIZE);
        RuntimeConfig { stack_size }
    }
}

/// Parse `65536` or `0x10000`.
#[must_use]
pub fn parse_stack_size(raw: &str) -> Option<usize> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16).ok()
    } else {
        raw.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    #[serde(deserialize_with = "stack_size_opt")]
    pub stack_size: Option<usize>,
}

/// Settings for the process-isolated executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolatedConfig {
    /// Upper bound on one worker run; the worker is killed after it
    pub timeout_ms: u64,
    /// Worker executable; the running binary when unset
    pub worker_program: Option<PathBuf>,
    pub worker_args: Vec<String>,
}

impl Default for IsolatedConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_ISOLATED_TIMEOUT_MS,
            worker_program: None,
            worker_args: Vec::new(),
        }
    }
}

impl IsolatedConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub runtime: RuntimeSection,
    pub isolated: IsolatedConfig,
    /// Process-lifetime values seeded into the root execution unit
    pub context: Map<String, Value>,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// `None` falls back to the defaults.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Effective runtime settings: the file value wins over `ZEAL_STACK_SIZE`.
    #[must_use]
    pub fn runtime_config(&self) -> RuntimeConfig {
        match self.runtime.stack_size {
            Some(stack_size) => RuntimeConfig { stack_size },
            None => RuntimeConfig::from_env(),
        }
    }
}

fn stack_size_opt<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(usize),
        Text(String),
    }
    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => parse_stack_size(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid stack size `{s}`"))),
    }
}
