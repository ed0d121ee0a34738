//! Configuration for enterprise-nexus
//!
//! Values come from three layers, later ones winning:
//! 1. built-in defaults
//! 2. an optional TOML file (`--config`)
//! 3. CLI flags / environment variables (a `.env` file is loaded first)
//!
//! Secrets (JWT secret, summarizer key) are never written back to the file.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::auth::scope::MissingScopePolicy;
use crate::error::NexusError;

/// Secret used when running with `--dev-mode` and no JWT_SECRET
pub const DEV_JWT_SECRET: &str = "dev-mode-secret-not-for-production-use-123456";

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("enterprise-nexus")
}

/// Enterprise Nexus - scoped enterprise relationship service
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "enterprise-nexus")]
#[command(about = "Enterprise relationship service for the AI partner ecosystem")]
pub struct Args {
    /// Path to config file
    #[arg(short, long, env = "NEXUS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory (database, backups, saved config)
    #[arg(long, env = "NEXUS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// SQLite database file (or `:memory:`)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Host to bind
    #[arg(long, env = "LISTEN_HOST")]
    pub host: Option<String>,

    /// HTTP port
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// JWT secret for token signing (required unless --dev-mode)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS")]
    pub jwt_expiry_seconds: Option<u64>,

    /// Development mode: fixed JWT secret when none is configured
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// API key for the summarization service
    #[arg(long, env = "MOONSHOT_API_KEY")]
    pub summarizer_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible summarization API
    #[arg(long, env = "SUMMARIZER_BASE_URL")]
    pub summarizer_base_url: Option<String>,

    /// Summarization model
    #[arg(long, env = "SUMMARIZER_MODEL")]
    pub summarizer_model: Option<String>,

    /// Timeout for fetching policy pages, in seconds
    #[arg(long, env = "FETCH_TIMEOUT_SECS")]
    pub fetch_timeout_secs: Option<u64>,

    /// What to do with tokens lacking an env claim: reject | prod | demo
    #[arg(long, env = "MISSING_SCOPE")]
    pub missing_scope: Option<String>,

    /// Bootstrap ARCHITECT account created on startup if absent
    #[arg(long, env = "ADMIN_USERNAME")]
    pub admin_username: Option<String>,

    /// Password for the bootstrap account
    #[arg(long, env = "ADMIN_PASSWORD")]
    pub admin_password: Option<String>,
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// SQLite path; defaults to `<data_dir>/nexus.db`
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_seconds: u64,

    #[serde(default = "default_summarizer_base_url")]
    pub summarizer_base_url: String,

    #[serde(default = "default_summarizer_model")]
    pub summarizer_model: String,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// `reject`, `prod` or `demo`
    #[serde(default = "default_missing_scope")]
    pub missing_scope: String,

    /// Role -> capability names, merged over the built-in role map
    #[serde(default)]
    pub roles: BTreeMap<String, Vec<String>>,

    #[serde(skip)]
    pub jwt_secret: Option<String>,

    #[serde(skip)]
    pub dev_mode: bool,

    #[serde(skip)]
    pub summarizer_api_key: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_jwt_expiry() -> u64 {
    24 * 60 * 60
}

fn default_summarizer_base_url() -> String {
    crate::summarizer::moonshot::DEFAULT_BASE_URL.to_string()
}

fn default_summarizer_model() -> String {
    "moonshot-v1-8k".to_string()
}

fn default_fetch_timeout() -> u64 {
    20
}

fn default_missing_scope() -> String {
    "reject".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_url: None,
            host: default_host(),
            port: default_port(),
            jwt_expiry_seconds: default_jwt_expiry(),
            summarizer_base_url: default_summarizer_base_url(),
            summarizer_model: default_summarizer_model(),
            fetch_timeout_secs: default_fetch_timeout(),
            missing_scope: default_missing_scope(),
            roles: BTreeMap::new(),
            jwt_secret: None,
            dev_mode: false,
            summarizer_api_key: None,
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, NexusError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| NexusError::Config(e.to_string()))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), NexusError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| NexusError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Build the effective config: file (if any) then CLI/env overrides
    pub fn from_args(args: &Args) -> Result<Self, NexusError> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        Ok(config)
    }

    /// Apply CLI overrides
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(dir) = &args.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(url) = &args.database_url {
            self.database_url = Some(url.clone());
        }
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(expiry) = args.jwt_expiry_seconds {
            self.jwt_expiry_seconds = expiry;
        }
        if let Some(url) = &args.summarizer_base_url {
            self.summarizer_base_url = url.clone();
        }
        if let Some(model) = &args.summarizer_model {
            self.summarizer_model = model.clone();
        }
        if let Some(secs) = args.fetch_timeout_secs {
            self.fetch_timeout_secs = secs;
        }
        if let Some(policy) = &args.missing_scope {
            self.missing_scope = policy.clone();
        }
        self.jwt_secret = args.jwt_secret.clone().filter(|s| !s.is_empty());
        self.summarizer_api_key = args.summarizer_api_key.clone().filter(|s| !s.is_empty());
        self.dev_mode = args.dev_mode;
    }

    /// Database path, defaulting into the data directory
    pub fn database_path(&self) -> String {
        self.database_url.clone().unwrap_or_else(|| {
            self.data_dir.join("nexus.db").to_string_lossy().into_owned()
        })
    }

    /// Directory for database snapshots
    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    /// Saved config file path
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    /// Bind address string
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// JWT secret, falling back to the dev secret only in dev mode
    pub fn effective_jwt_secret(&self) -> Result<String, NexusError> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => Ok(secret.clone()),
            (None, true) => Ok(DEV_JWT_SECRET.to_string()),
            (None, false) => Err(NexusError::Config(
                "JWT_SECRET is required unless --dev-mode is set".into(),
            )),
        }
    }

    /// Parsed policy for tokens without an env claim
    pub fn missing_scope_policy(&self) -> Result<MissingScopePolicy, NexusError> {
        self.missing_scope.parse()
    }
}
