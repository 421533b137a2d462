//! Configuration for ticketd.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (TICKETD_HOME, TICKETD_GROUP, TICKETD_API_URL,
//!    TICKETD_API_KEY)
//! 2. Config file (.ticketd/config.yaml)
//! 3. Defaults (~/.ticketd, mock backend)
//!
//! Config file discovery walks the current directory and its parents for
//! `.ticketd/config.yaml`. The resolved configuration is a plain value
//! handed to the composition root; components receive their settings at
//! construction time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::broker::BrokerOptions;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub broker: Option<BrokerConfig>,
    #[serde(default)]
    pub backend: Option<BackendConfig>,
    #[serde(default)]
    pub processing: Option<ProcessingConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrokerConfig {
    /// Consumer group shared by the workers
    pub group: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub delivery_window_ms: Option<u64>,
    pub max_deliveries: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendConfig {
    /// "mock" or "http"
    pub kind: Option<String>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessingConfig {
    pub timeout_seconds: Option<u64>,
}

/// Which backend adapter the composition root constructs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Mock,
    Http,
}

impl BackendKind {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "mock" => Ok(Self::Mock),
            "http" => Ok(Self::Http),
            other => anyhow::bail!("unknown backend kind '{}' (expected mock or http)", other),
        }
    }
}

/// Resolved configuration with all defaults applied
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory; tickets and the stream journal live under it
    pub home: PathBuf,

    /// Consumer group name for the workers
    pub group: String,

    /// Broker delivery tuning
    pub broker: BrokerOptions,

    /// Backend selection
    pub backend: BackendKind,

    /// Completion endpoint for the http backend
    pub api_url: Option<String>,

    /// Bearer token for the http backend
    pub api_key: Option<String>,

    /// Deadline for one backend call
    pub processing_timeout: Duration,

    /// Path to the config file, if one was found
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Directory of persisted ticket documents
    pub fn tickets_dir(&self) -> PathBuf {
        self.home.join("tickets")
    }

    /// Root of the stream journal
    pub fn stream_dir(&self) -> PathBuf {
        self.home.join("stream")
    }
}

/// Find the config file by searching the current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".ticketd").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse a config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Apply defaults and environment overrides to an optional config file
fn resolve(file: Option<ConfigFile>, config_path: Option<PathBuf>) -> Result<ResolvedConfig> {
    let file = file.unwrap_or(ConfigFile {
        version: "1".to_string(),
        home: None,
        broker: None,
        backend: None,
        processing: None,
    });

    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".ticketd");

    let home = if let Ok(env_home) = std::env::var("TICKETD_HOME") {
        PathBuf::from(env_home)
    } else if let Some(ref home) = file.home {
        PathBuf::from(home)
    } else {
        default_home
    };

    let broker_file = file.broker.unwrap_or_default();
    let defaults = BrokerOptions::default();
    let broker = BrokerOptions {
        poll_interval: broker_file
            .poll_interval_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval),
        delivery_window: broker_file
            .delivery_window_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.delivery_window),
        max_deliveries: broker_file.max_deliveries.unwrap_or(defaults.max_deliveries),
    };

    let group = std::env::var("TICKETD_GROUP")
        .ok()
        .or(broker_file.group)
        .unwrap_or_else(|| crate::core::DEFAULT_GROUP.to_string());

    let backend_file = file.backend.unwrap_or_default();
    let backend = match backend_file.kind {
        Some(ref kind) => BackendKind::parse(kind)?,
        None => BackendKind::Mock,
    };
    let api_url = std::env::var("TICKETD_API_URL").ok().or(backend_file.api_url);
    let api_key = std::env::var("TICKETD_API_KEY").ok().or(backend_file.api_key);

    if backend == BackendKind::Http && api_url.is_none() {
        anyhow::bail!("http backend requires backend.api_url or TICKETD_API_URL");
    }

    let processing_timeout = file
        .processing
        .and_then(|p| p.timeout_seconds)
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(120));

    Ok(ResolvedConfig {
        home,
        group,
        broker,
        backend,
        api_url,
        api_key,
        processing_timeout,
        config_file: config_path,
    })
}

/// Load configuration from all sources
pub fn load() -> Result<ResolvedConfig> {
    match find_config_file() {
        Some(path) => {
            let file = load_config_file(&path)?;
            resolve(Some(file), Some(path))
        }
        None => resolve(None, None),
    }
}
