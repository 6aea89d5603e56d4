//! Incremental model response fragments.
//!
//! A model turn arrives as an ordered stream of [`ResponseFragment`] values.
//! Most fragments are [`ChatChunk`]s carrying a [`ChoiceDelta`]; the rest are
//! [`StreamMarker`]s emitted by the pipeline itself, which carry no delta and
//! are always forwarded untouched.

use serde::{Deserialize, Serialize};

/// One unit of incremental model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseFragment {
    /// A model response chunk, possibly carrying a delta.
    Chunk(ChatChunk),
    /// A pipeline-level item with no delta payload.
    Marker(StreamMarker),
}

impl ResponseFragment {
    /// Shorthand for a chunk carrying only text content.
    pub fn text(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Chunk(ChatChunk {
            id: id.into(),
            delta: Some(ChoiceDelta {
                content: Some(content.into()),
                ..Default::default()
            }),
        })
    }

    /// Shorthand for a chunk carrying only tool-call deltas.
    pub fn tool_calls(id: impl Into<String>, tool_calls: Vec<ToolCallDelta>) -> Self {
        Self::Chunk(ChatChunk {
            id: id.into(),
            delta: Some(ChoiceDelta {
                tool_calls,
                ..Default::default()
            }),
        })
    }

    /// Returns the delta if this is a chunk that carries one.
    pub fn delta(&self) -> Option<&ChoiceDelta> {
        match self {
            Self::Chunk(chunk) => chunk.delta.as_ref(),
            Self::Marker(_) => None,
        }
    }
}

/// A chunk of a streamed chat completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Completion identifier assigned by the backend.
    pub id: String,
    /// The incremental payload. `None` for chunks that only carry metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<ChoiceDelta>,
}

/// The incremental payload of a chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Spoken text, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Partial tool-call descriptors, in producer order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
}

impl ChoiceDelta {
    /// Returns the text content when it is present and non-empty.
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|content| !content.is_empty())
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A partial tool invocation.
///
/// Backends split a single call across several deltas sharing the same
/// `index`; the first usually carries `call_id` and `name`, later ones only
/// append to `arguments`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Partial JSON argument text.
    #[serde(default)]
    pub arguments: String,
}

impl ToolCallDelta {
    /// Creates the opening delta of a call.
    pub fn new(index: u32, call_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            index,
            call_id: Some(call_id.into()),
            name: Some(name.into()),
            arguments: String::new(),
        }
    }

    /// Builder: append argument text.
    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = arguments.into();
        self
    }
}

/// Items injected into the stream that are not model deltas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "marker", rename_all = "snake_case")]
pub enum StreamMarker {
    /// Asks the speech stage to flush whatever it has buffered.
    Flush,
    /// Token accounting reported at the end of a completion.
    Usage(CompletionUsage),
}

/// Token usage for one completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}
