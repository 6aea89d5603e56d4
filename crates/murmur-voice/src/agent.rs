use crate::error::VoiceError;
use crate::gate::SpeechGate;
use crate::llm::{FragmentStream, ResponseSource};
use crate::mcp::McpServerHttp;
use crate::pacing::SpeechPacing;
use futures_util::stream::StreamExt;
use murmur_types::{ChatContext, ToolSpec};
use std::sync::Arc;
use tracing::{info, warn};

/// A voice agent that holds tool calls back until its narration is spoken.
///
/// The model response for each turn passes through a [`SpeechGate`]: text
/// reaches the speech stage as soon as it is produced, tool calls follow
/// once the estimated speaking time has elapsed.
pub struct TimedAgent<S> {
    instructions: String,
    source: Arc<S>,
    mcp_servers: Vec<McpServerHttp>,
    tools: Vec<ToolSpec>,
    gate: SpeechGate,
}

impl<S: ResponseSource + 'static> TimedAgent<S> {
    pub fn new(instructions: impl Into<String>, source: Arc<S>) -> Self {
        Self {
            instructions: instructions.into(),
            source,
            mcp_servers: Vec::new(),
            tools: Vec::new(),
            gate: SpeechGate::default(),
        }
    }

    /// Builder: attach external tool servers.
    pub fn with_mcp_servers(mut self, servers: Vec<McpServerHttp>) -> Self {
        self.mcp_servers = servers;
        self
    }

    /// Builder: override the pacing tunables.
    pub fn with_pacing(mut self, pacing: SpeechPacing) -> Self {
        self.gate = SpeechGate::new(pacing);
        self
    }

    /// Builder: tools offered to the model in addition to discovered ones.
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn mcp_servers(&self) -> &[McpServerHttp] {
        &self.mcp_servers
    }

    pub fn pacing(&self) -> &SpeechPacing {
        self.gate.pacing()
    }

    /// Connects every MCP server and collects its tools.
    ///
    /// A tool whose name is already known is skipped so the model never sees
    /// duplicates. Returns the total number of tools offered afterwards.
    pub async fn load_tools(&mut self) -> Result<usize, VoiceError> {
        for server in &self.mcp_servers {
            server.initialize().await?;
            for tool in server.list_tools().await? {
                if self.tools.iter().any(|known| known.name == tool.name) {
                    warn!(tool = %tool.name, url = %server.url(), "skipping duplicate tool");
                    continue;
                }
                self.tools.push(tool);
            }
        }
        info!(
            servers = self.mcp_servers.len(),
            tools = self.tools.len(),
            "agent tools loaded"
        );
        Ok(self.tools.len())
    }

    /// Runs the model for one turn and paces its output.
    ///
    /// The returned stream owns everything it needs, so it may outlive the
    /// borrow of `chat_ctx`.
    pub fn llm_node(&self, chat_ctx: &ChatContext) -> FragmentStream {
        let source = Arc::clone(&self.source);
        let chat_ctx = chat_ctx.clone();
        let tools = self.tools.clone();

        let upstream = async move { source.respond(&chat_ctx, &tools).await };
        self.gate.apply(upstream).boxed()
    }
}
