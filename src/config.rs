use serde::{Deserialize, Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8080";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Store server URL (e.g., "ws://localhost:8080" or "wss://farm.example.com")
    pub server_url: ConfigValue<String>,
    /// API key for authentication
    #[serde(serialize_with = "serialize_masked")]
    pub api_key: ConfigValue<Option<String>>,
    /// Seconds to wait when connecting to the server
    pub connect_timeout_secs: ConfigValue<u64>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    server_url: Option<String>,
    api_key: Option<String>,
    connect_timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        // Start with defaults
        let mut server_url =
            ConfigValue::new(DEFAULT_SERVER_URL.to_string(), ConfigSource::Default);
        let mut api_key = ConfigValue::new(None, ConfigSource::Default);
        let mut connect_timeout_secs =
            ConfigValue::new(DEFAULT_CONNECT_TIMEOUT_SECS, ConfigSource::Default);
        let mut config_file = None;

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(url) = file_config.server_url {
                server_url = ConfigValue::new(url, ConfigSource::File);
            }
            if let Some(key) = file_config.api_key {
                api_key = ConfigValue::new(Some(key), ConfigSource::File);
            }
            if let Some(secs) = file_config.connect_timeout_secs {
                connect_timeout_secs = ConfigValue::new(secs, ConfigSource::File);
            }
        }

        // Apply environment variable overrides
        if let Ok(url) = std::env::var("FARMSYNC_SERVER_URL") {
            server_url = ConfigValue::new(url, ConfigSource::Environment);
        }
        if let Ok(key) = std::env::var("FARMSYNC_API_KEY") {
            api_key = ConfigValue::new(Some(key), ConfigSource::Environment);
        }
        if let Ok(secs) = std::env::var("FARMSYNC_CONNECT_TIMEOUT") {
            let secs = secs
                .parse()
                .map_err(|_| ConfigError::InvalidValue("FARMSYNC_CONNECT_TIMEOUT", secs))?;
            connect_timeout_secs = ConfigValue::new(secs, ConfigSource::Environment);
        }

        Ok(Self {
            server_url,
            api_key,
            connect_timeout_secs,
            config_file,
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.value)
    }

    /// The API key, or an error explaining how to set one.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .value
            .as_deref()
            .ok_or(ConfigError::MissingApiKey)
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/farmsync/
    /// - macOS: ~/Library/Application Support/farmsync/
    /// - Windows: %APPDATA%/farmsync/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("farmsync")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

/// Shows only the first four characters of a key.
pub fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    if prefix.len() == key.len() {
        return "****".to_string();
    }
    format!("{}****", prefix)
}

fn serialize_masked<S: Serializer>(
    key: &ConfigValue<Option<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    ConfigValue::new(key.value.as_deref().map(mask_key), key.source.clone()).serialize(serializer)
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(&'static str, String),
    MissingApiKey,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(name, value) => {
                write!(f, "Invalid value for {}: '{}'", name, value)
            }
            ConfigError::MissingApiKey => write!(
                f,
                "No API key configured. Set api_key in the config file or FARMSYNC_API_KEY."
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
