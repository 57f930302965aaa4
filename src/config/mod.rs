use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Mark the session cookie `Secure` (only sent over HTTPS)
    #[serde(default)]
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            secure_cookies: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Full sqlx connection string. Falls back to a file inside `server.data_dir`.
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to sign session tokens. Required.
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantConfig {
    /// API key for the assistant service. Required.
    pub api_key: Option<String>,
    /// Identifier of the assistant every new conversation is bound to. Required.
    pub assistant_id: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Delay between run status polls in milliseconds (default: 1000)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on waiting for a run to finish in seconds (default: 60)
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// Timeout for each individual HTTP request in seconds (default: 30)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            assistant_id: None,
            base_url: default_base_url(),
            poll_interval_ms: default_poll_interval_ms(),
            run_timeout_secs: default_run_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_run_timeout_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
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

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load the config file (if any), apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&content)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse configuration file")
    }

    /// Overlay values from the environment. `lookup` is `std::env::var` outside of tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(secret) = lookup("SECRET_KEY") {
            self.auth.secret_key = Some(secret);
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.assistant.api_key = Some(key);
        }
        if let Some(id) = lookup("ASSISTANT_ID") {
            self.assistant.assistant_id = Some(id);
        }
        if let Some(base_url) = lookup("OPENAI_BASE_URL") {
            self.assistant.base_url = base_url;
        }
    }

    /// Reject configurations the server cannot start with.
    pub fn validate(&self) -> Result<()> {
        if is_blank(&self.auth.secret_key) {
            bail!("auth.secret_key (or SECRET_KEY) must be set to sign session tokens");
        }
        if is_blank(&self.assistant.api_key) {
            bail!("assistant.api_key (or OPENAI_API_KEY) must be set");
        }
        if is_blank(&self.assistant.assistant_id) {
            bail!("assistant.assistant_id (or ASSISTANT_ID) must be set");
        }
        if self.assistant.poll_interval_ms == 0 {
            bail!("assistant.poll_interval_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn database_url(&self) -> String {
        match &self.database.url {
            Some(url) => url.clone(),
            None => format!(
                "sqlite:{}?mode=rwc",
                self.server.data_dir.join("llm-connect.db").display()
            ),
        }
    }

    pub fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            assistant: AssistantConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}
