use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("LiveKit API error: {0}")]
    LiveKit(#[from] livekit_api::access_token::AccessTokenError),

    #[error("Room service error: {0}")]
    RoomService(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("MCP error: {0}")]
    Mcp(String),
}
