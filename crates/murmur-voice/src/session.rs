use crate::agent::TimedAgent;
use crate::config::{LlmConfig, SessionOptions, SttModel, TtsModel};
use crate::llm::{FragmentStream, ResponseSource};
use murmur_types::{ChatContext, ChatRole};
use std::sync::Arc;
use tracing::info;

/// Models used by one session, as handed to the session runtime.
#[derive(Debug, Clone, Default)]
pub struct SessionModels {
    pub stt: SttModel,
    pub llm: LlmConfig,
    pub tts: TtsModel,
}

/// One agent conversation in one room.
///
/// Holds the chat history and the pass-through tunables. Each call to
/// [`AgentSession::run_turn`] produces a fresh gated stream; no gate state
/// is carried from one turn to the next.
pub struct AgentSession<S> {
    room: String,
    agent: Arc<TimedAgent<S>>,
    models: SessionModels,
    options: SessionOptions,
    chat_ctx: ChatContext,
}

impl<S: ResponseSource + 'static> AgentSession<S> {
    pub fn start(
        room: impl Into<String>,
        agent: Arc<TimedAgent<S>>,
        models: SessionModels,
        options: SessionOptions,
    ) -> Self {
        let room = room.into();
        let chat_ctx = ChatContext::with_instructions(agent.instructions());

        info!(
            room = %room,
            stt = %models.stt.model,
            llm = %models.llm.model,
            tts = %models.tts.model,
            max_tool_steps = options.max_tool_steps,
            allow_interruptions = options.allow_interruptions,
            min_interruption_words = options.min_interruption_words,
            preemptive_generation = options.preemptive_generation,
            tools = agent.tools().len(),
            "agent session started"
        );

        Self {
            room,
            agent,
            models,
            options,
            chat_ctx,
        }
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn agent(&self) -> &TimedAgent<S> {
        &self.agent
    }

    pub fn models(&self) -> &SessionModels {
        &self.models
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn chat_ctx(&self) -> &ChatContext {
        &self.chat_ctx
    }

    /// Records what the user said and returns the agent's paced response.
    pub fn run_turn(&mut self, user_text: &str) -> FragmentStream {
        self.chat_ctx.push(ChatRole::User, user_text);
        self.agent.llm_node(&self.chat_ctx)
    }

    /// Records the narration the agent produced, for the next turn.
    pub fn record_assistant(&mut self, text: &str) {
        if !text.is_empty() {
            self.chat_ctx.push(ChatRole::Assistant, text);
        }
    }
}
