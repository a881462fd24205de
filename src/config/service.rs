// src/config/service.rs
//! Service configuration: defaults, optional TOML file, then env overrides.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::{env, fs};

pub const ENV_CONFIG_PATH: &str = "BOOKS_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/service.toml";

pub const ENV_BIND_ADDR: &str = "BOOKS_BIND_ADDR";
pub const ENV_CATALOG_URL: &str = "BOOKS_CATALOG_URL";
pub const ENV_DISPATCH_WORKERS: &str = "BOOKS_DISPATCH_WORKERS";
pub const ENV_SCORING_WORKERS: &str = "BOOKS_SCORING_WORKERS";
pub const ENV_METRICS: &str = "BOOKS_METRICS";
pub const ENV_LOG_FORMAT: &str = "BOOKS_LOG_FORMAT";

fn default_bind_addr() -> String {
    "127.0.0.1:5057".to_string()
}
fn default_dispatch_workers() -> usize {
    64
}
fn default_scoring_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
fn default_base_url() -> String {
    "https://www.googleapis.com/books/v1/volumes".to_string()
}
fn default_user_agent() -> String {
    concat!("books-sentiment/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_connect_timeout_ms() -> u64 {
    4_000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Upper bound on request handlers blocked in the pipeline at once.
    #[serde(default = "default_dispatch_workers")]
    pub dispatch_workers: usize,
    /// Threads in the scoring pool (and engines in the scorer pool).
    #[serde(default = "default_scoring_workers")]
    pub scoring_workers: usize,
    #[serde(default)]
    pub metrics_enabled: bool,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            catalog: CatalogConfig::default(),
            dispatch_workers: default_dispatch_workers(),
            scoring_workers: default_scoring_workers(),
            metrics_enabled: false,
            log_format: LogFormat::default(),
        }
    }
}

impl ServiceConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading service config from {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))
    }

    /// Resolve configuration:
    /// 1) $BOOKS_CONFIG_PATH (must exist)
    /// 2) config/service.toml
    /// 3) built-in defaults
    ///
    /// then apply `BOOKS_*` env overrides and validate.
    pub fn load() -> Result<Self> {
        let mut cfg = if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from_file(&pb)?
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::load_from_file(DEFAULT_CONFIG_PATH)?
        } else {
            Self::default()
        };
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = env::var(ENV_BIND_ADDR) {
            self.bind_addr = v.trim().to_string();
        }
        if let Ok(v) = env::var(ENV_CATALOG_URL) {
            self.catalog.base_url = v.trim().to_string();
        }
        if let Ok(v) = env::var(ENV_DISPATCH_WORKERS) {
            self.dispatch_workers = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_DISPATCH_WORKERS}={v} is not a number"))?;
        }
        if let Ok(v) = env::var(ENV_SCORING_WORKERS) {
            self.scoring_workers = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_SCORING_WORKERS}={v} is not a number"))?;
        }
        if let Ok(v) = env::var(ENV_METRICS) {
            self.metrics_enabled = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true");
        }
        if let Ok(v) = env::var(ENV_LOG_FORMAT) {
            self.log_format = match v.trim().to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" | "" => LogFormat::Compact,
                other => bail!("unsupported {ENV_LOG_FORMAT}: {other}"),
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.dispatch_workers == 0 {
            bail!("dispatch_workers must be at least 1");
        }
        if self.scoring_workers == 0 {
            bail!("scoring_workers must be at least 1");
        }
        if self.catalog.base_url.trim().is_empty() {
            bail!("catalog.base_url must not be empty");
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_addr
            .parse()
            .with_context(|| format!("invalid bind_addr {}", self.bind_addr))
    }
}
