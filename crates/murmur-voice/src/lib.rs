//! Voice agent pipeline for murmur.
//!
//! Connects a streaming model backend to a LiveKit room session and paces
//! tool calls against the agent's own speech: narration is handed to speech
//! synthesis as it streams in, while tool-call deltas are held until the
//! synthesizer has had time to speak the preceding text.
//!
//! Speech recognition, synthesis and media transport are delegated to the
//! session runtime; this crate owns the response pipeline between the model
//! and that runtime, plus tool discovery and room access tokens.

pub mod agent;
pub mod config;
pub mod error;
pub mod gate;
pub mod llm;
pub mod mcp;
pub mod pacing;
pub mod service;
pub mod session;

pub use agent::TimedAgent;
pub use config::{LiveKitConfig, LlmConfig, McpConfig, SessionOptions, SttModel, TtsModel};
pub use error::VoiceError;
pub use gate::{GateSession, SpeechGate};
pub use llm::{ChatCompletionsClient, FragmentStream, ResponseSource};
pub use mcp::{McpServerHttp, ServerInfo};
pub use pacing::{count_words, SpeechPacing};
pub use service::VoiceService;
pub use session::{AgentSession, SessionModels};
