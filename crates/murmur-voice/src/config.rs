use serde::{Deserialize, Serialize};
use std::fmt;

fn default_token_ttl_seconds() -> u64 {
    3600
}

fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_llm_model() -> String {
    "anthropic/claude-sonnet-4.5".to_string()
}

fn default_stt_model() -> String {
    "gpt-4o-transcribe".to_string()
}

fn default_tts_model() -> String {
    "elevenlabs/eleven_turbo_v2_5".to_string()
}

fn default_tts_voice() -> String {
    "Xb7hH8MSUJpSbSDYk0k2".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_mcp_timeout_seconds() -> u64 {
    10
}

fn default_max_tool_steps() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_min_interruption_words() -> u32 {
    1
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LiveKitConfig {
    pub url: String,
    pub api_key: String,
    #[serde(skip_serializing)]
    pub api_secret: String,
    /// JWT token TTL in seconds for agent join tokens. Default: 3600 (1 hour).
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
}

impl Default for LiveKitConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            token_ttl_seconds: default_token_ttl_seconds(),
        }
    }
}

impl fmt::Debug for LiveKitConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveKitConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("token_ttl_seconds", &self.token_ttl_seconds)
            .finish()
    }
}

impl LiveKitConfig {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            token_ttl_seconds: default_token_ttl_seconds(),
        }
    }
}

/// OpenAI-compatible chat completions backend.
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Bearer credential. Required; the worker refuses to start without it.
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key: String::new(),
            model: default_llm_model(),
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

impl LlmConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Builder: set model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Speech-to-text model handed to the session runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SttModel {
    #[serde(default = "default_stt_model")]
    pub model: String,
}

impl Default for SttModel {
    fn default() -> Self {
        Self {
            model: default_stt_model(),
        }
    }
}

/// Text-to-speech model handed to the session runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsModel {
    #[serde(default = "default_tts_model")]
    pub model: String,
    #[serde(default = "default_tts_voice")]
    pub voice: String,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for TtsModel {
    fn default() -> Self {
        Self {
            model: default_tts_model(),
            voice: default_tts_voice(),
            language: default_language(),
        }
    }
}

/// External tool server reached over streamable HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpConfig {
    /// Server URL. When unset the agent runs without external tools.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_mcp_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_seconds: default_mcp_timeout_seconds(),
        }
    }
}

/// Per-session tunables passed through to the session runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Max consecutive tool-call steps in one turn.
    #[serde(default = "default_max_tool_steps")]
    pub max_tool_steps: u32,
    #[serde(default = "default_true")]
    pub allow_interruptions: bool,
    /// Words the user must say before speech counts as an interruption.
    #[serde(default = "default_min_interruption_words")]
    pub min_interruption_words: u32,
    /// Start generating while the user's turn is still being finalized.
    #[serde(default = "default_true")]
    pub preemptive_generation: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_tool_steps: default_max_tool_steps(),
            allow_interruptions: true,
            min_interruption_words: default_min_interruption_words(),
            preemptive_generation: true,
        }
    }
}
