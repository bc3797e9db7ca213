use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use metadata::{LlmSettings, RetryPolicy};
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DB_PATH: &str = "phono.redb";
const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60 * 24 * 7;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let settings = LlmSettings::default();
        Self {
            api_base: settings.api_base,
            api_key: String::new(),
            model: settings.model,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            max_attempts: metadata::DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_ms: metadata::DEFAULT_BASE_DELAY.as_millis() as u64,
            timeout_secs: settings.timeout.as_secs(),
        }
    }
}

impl LlmConfig {
    pub fn settings(&self) -> LlmSettings {
        LlmSettings {
            api_base: self.api_base.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub version: u32,
    pub port: u16,
    pub db_path: String,
    pub session_ttl_secs: u64,
    /// Lifetime of cached collection reads; 0 turns the cache off.
    pub cache_ttl_secs: u64,
    pub llm: LlmConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            port: DEFAULT_PORT,
            db_path: DEFAULT_DB_PATH.to_string(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            cache_ttl_secs: 60,
            llm: LlmConfig::default(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("PHONO_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

/// Reads the config at `path`, writing defaults there first if it is
/// missing. The flag reports whether the file was created.
pub fn load_or_create_config(path: &Path) -> Result<(ServerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: ServerConfig = serde_yaml::from_str(&contents)?;
        normalize(&mut config);
        apply_env_overrides(&mut config);
        return Ok((config, false));
    }

    let mut config = ServerConfig::default();
    save_config(path, &config)?;
    apply_env_overrides(&mut config);
    Ok((config, true))
}

pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

fn normalize(config: &mut ServerConfig) {
    if config.version < CONFIG_VERSION {
        config.version = CONFIG_VERSION;
    }
    if config.port == 0 {
        config.port = DEFAULT_PORT;
    }
    if config.db_path.trim().is_empty() {
        config.db_path = DEFAULT_DB_PATH.to_string();
    }
    if config.session_ttl_secs == 0 {
        config.session_ttl_secs = DEFAULT_SESSION_TTL_SECS;
    }
    let defaults = LlmConfig::default();
    let llm = &mut config.llm;
    if llm.api_base.trim().is_empty() {
        llm.api_base = defaults.api_base;
    }
    if llm.model.trim().is_empty() {
        llm.model = defaults.model;
    }
    if llm.max_tokens == 0 {
        llm.max_tokens = defaults.max_tokens;
    }
    if llm.max_attempts == 0 {
        llm.max_attempts = defaults.max_attempts;
    }
    if llm.timeout_secs == 0 {
        llm.timeout_secs = defaults.timeout_secs;
    }
}

fn apply_env_overrides(config: &mut ServerConfig) {
    if config.llm.api_key.trim().is_empty() {
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            config.llm.api_key = key.trim().to_string();
        }
    }
}
