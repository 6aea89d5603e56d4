//! Shared types for the murmur voice agent.
//!
//! This crate holds the values that cross crate boundaries: incremental model
//! response fragments, the chat context sent to the model backend, and the
//! tool descriptors discovered from external tool servers.
//!
//! Nothing here performs I/O. The gate, the model client and the worker all
//! agree on these definitions so that a fragment produced by the backend
//! client can be routed unchanged to speech synthesis or tool dispatch.

pub mod chat;
pub mod fragment;

pub use chat::{ChatContext, ChatMessage, ChatRole, ToolSpec};
pub use fragment::{
    ChatChunk, ChoiceDelta, CompletionUsage, ResponseFragment, StreamMarker, ToolCallDelta,
};
