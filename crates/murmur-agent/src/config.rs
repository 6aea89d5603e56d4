//! Worker configuration loading from file and environment variables.

use murmur_voice::{
    LiveKitConfig, LlmConfig, McpConfig, SessionOptions, SpeechPacing, SttModel, TtsModel,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Instructions used when neither `agent.instructions` nor
/// `agent.prompt_path` is configured.
pub const DEFAULT_INSTRUCTIONS: &str = "You are a voice assistant. Answer in short, \
plain spoken sentences without markdown. Before calling a tool, briefly tell the user \
what you are about to do.";

/// Top-level worker configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Job endpoint network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub livekit: LiveKitConfig,

    /// Model backend. `llm.api_key` is required.
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub stt: SttModel,

    #[serde(default)]
    pub tts: TtsModel,

    /// Optional external tool server.
    #[serde(default)]
    pub mcp: McpConfig,

    /// Per-session tunables passed to the session runtime.
    #[serde(default)]
    pub session: SessionOptions,

    #[serde(default)]
    pub agent: AgentConfig,

    /// Tool-call pacing.
    #[serde(default)]
    pub pacing: SpeechPacing,
}

/// Network configuration for the job endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "murmur_voice=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Agent identity and instructions.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Participant name shown in rooms.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Inline system prompt. Takes precedence over `prompt_path`.
    #[serde(default)]
    pub instructions: Option<String>,

    /// File holding the system prompt.
    #[serde(default)]
    pub prompt_path: Option<PathBuf>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8081
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_agent_name() -> String {
    "murmur".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            instructions: None,
            prompt_path: None,
        }
    }
}

impl AgentConfig {
    /// Resolves the system prompt once, at startup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Prompt` if `prompt_path` is set but unreadable.
    pub fn load_instructions(&self) -> Result<String, ConfigError> {
        if let Some(instructions) = &self.instructions {
            return Ok(instructions.clone());
        }
        match &self.prompt_path {
            Some(path) => std::fs::read_to_string(path).map_err(|source| ConfigError::Prompt {
                path: path.display().to_string(),
                source,
            }),
            None => Ok(DEFAULT_INSTRUCTIONS.to_string()),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required credential is absent from both file and environment.
    #[error("{0} is required (set it in the environment or the config file)")]
    MissingCredential(&'static str),

    /// The system prompt file could not be read.
    #[error("failed to read system prompt {path}: {source}")]
    Prompt {
        path: String,
        source: std::io::Error,
    },

    /// A setting has an unusable value.
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults, then
/// applies environment overrides and validates the result.
///
/// Environment variable overrides:
/// - `OPENROUTER_API_KEY` overrides `llm.api_key`
/// - `MCP_SERVER_URL` overrides `mcp.url`
/// - `LIVEKIT_URL`, `LIVEKIT_API_KEY`, `LIVEKIT_API_SECRET` override `livekit.*`
/// - `MURMUR_HOST` overrides `server.host`
/// - `MURMUR_PORT` overrides `server.port`
/// - `MURMUR_LOG_LEVEL` overrides `logging.level`
/// - `MURMUR_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// Variables may also come from a `.env` file in the working directory;
/// the process environment wins over it.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed, or
/// if the resulting configuration is unusable.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = read_config_file(path)?;
    apply_env_overrides(&mut config, env_lookup(Path::new(".env")));
    config.validate()?;
    Ok(config)
}

/// Looks variables up in the process environment, then in the dotenv file
/// at `dotenv_path`. A missing or unreadable file contributes nothing.
pub fn env_lookup(dotenv_path: &Path) -> impl Fn(&str) -> Option<String> {
    let file: HashMap<String, String> = match dotenvy::from_path_iter(dotenv_path) {
        Ok(entries) => entries.filter_map(Result::ok).collect(),
        Err(e) => {
            if !e.not_found() {
                tracing::warn!(path = %dotenv_path.display(), error = %e, "ignoring unreadable dotenv file");
            }
            HashMap::new()
        }
    };
    move |key| std::env::var(key).ok().or_else(|| file.get(key).cloned())
}

/// Parses the config file. A missing file yields defaults.
pub fn read_config_file(path: Option<&str>) -> Result<Config, ConfigError> {
    match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Ok(Config::default())
            }
            Err(e) => Err(ConfigError::FileRead(e)),
        },
        None => Ok(Config::default()),
    }
}

/// Applies overrides from `lookup`, which maps variable names to values.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(key) = non_empty("OPENROUTER_API_KEY") {
        config.llm.api_key = key;
    }
    if let Some(url) = non_empty("MCP_SERVER_URL") {
        config.mcp.url = Some(url);
    }
    if let Some(url) = non_empty("LIVEKIT_URL") {
        config.livekit.url = url;
    }
    if let Some(key) = non_empty("LIVEKIT_API_KEY") {
        config.livekit.api_key = key;
    }
    if let Some(secret) = non_empty("LIVEKIT_API_SECRET") {
        config.livekit.api_secret = secret;
    }
    if let Some(host) = non_empty("MURMUR_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = non_empty("MURMUR_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(level) = non_empty("MURMUR_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = non_empty("MURMUR_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}

impl Config {
    /// Checks the settings the worker cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential("OPENROUTER_API_KEY"));
        }
        if self.mcp.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "mcp.timeout_seconds must be greater than zero".to_string(),
            ));
        }
        self.pacing.validate().map_err(ConfigError::Invalid)
    }
}
