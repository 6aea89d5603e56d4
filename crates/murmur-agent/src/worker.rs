//! Room jobs: one paced agent session per room.

use chrono::{DateTime, Utc};
use futures_util::stream::StreamExt;
use murmur_types::ResponseFragment;
use murmur_voice::{
    AgentSession, ChatCompletionsClient, McpConfig, McpServerHttp, SessionModels,
    SessionOptions, SpeechPacing, TimedAgent, VoiceError, VoiceService,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Everything a job needs that is fixed at startup.
#[derive(Debug, Clone)]
pub struct JobTemplate {
    pub agent_name: String,
    pub instructions: String,
    pub models: SessionModels,
    pub options: SessionOptions,
    pub mcp: McpConfig,
    pub pacing: SpeechPacing,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("room {0} already has an agent")]
    AlreadyRunning(String),

    #[error("no agent in room {0}")]
    NotFound(String),

    #[error("room name is empty")]
    EmptyRoom,

    #[error(transparent)]
    Voice(#[from] VoiceError),
}

/// An agent dispatched into a room.
pub struct Job {
    id: Uuid,
    identity: String,
    started_at: DateTime<Utc>,
    session: Mutex<AgentSession<ChatCompletionsClient>>,
    tool_count: usize,
}

/// Public view of a running job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: Uuid,
    pub room: String,
    pub identity: String,
    pub started_at: DateTime<Utc>,
    pub tools: usize,
}

/// Returned when a job starts. Carries the credentials the media runtime
/// uses to join the room.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedJob {
    #[serde(flatten)]
    pub job: JobSummary,
    pub livekit_url: Option<String>,
    pub token: Option<String>,
}

/// What one turn produced, in delivery order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutcome {
    pub fragments: Vec<ResponseFragment>,
    /// Concatenated text content, recorded as the assistant's reply.
    pub narration: String,
    /// Number of fragments carrying tool calls.
    pub tool_calls: usize,
    /// Set when the backend failed partway through the turn.
    pub error: Option<String>,
}

/// Dispatches agents into rooms and tracks the running sessions.
pub struct Worker {
    template: JobTemplate,
    voice: Arc<VoiceService>,
    llm: Arc<ChatCompletionsClient>,
    // Lock held only for map operations, never across an await.
    jobs: RwLock<HashMap<String, Arc<Job>>>,
}

impl Worker {
    pub fn new(
        template: JobTemplate,
        voice: Arc<VoiceService>,
        llm: Arc<ChatCompletionsClient>,
    ) -> Self {
        Self {
            template,
            voice,
            llm,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Job entrypoint: joins `room`, loads tools and starts a session.
    pub async fn start_job(&self, room: &str) -> Result<StartedJob, WorkerError> {
        let room = room.trim();
        if room.is_empty() {
            return Err(WorkerError::EmptyRoom);
        }
        if self.contains(room) {
            return Err(WorkerError::AlreadyRunning(room.to_string()));
        }

        let identity = format!("agent-{}", room);
        let (livekit_url, token) = if self.voice.is_enabled() {
            let token =
                self.voice
                    .generate_agent_token(room, &identity, &self.template.agent_name)?;
            tracing::info!(
                room = %room,
                identity = %identity,
                token_len = token.len(),
                "minted agent join token"
            );
            (Some(self.voice.get_url().to_string()), Some(token))
        } else {
            tracing::warn!(room = %room, "LiveKit not configured, job runs without room media");
            (None, None)
        };

        let servers: Vec<McpServerHttp> = McpServerHttp::from_config(&self.template.mcp)?
            .into_iter()
            .collect();
        match servers.first() {
            Some(server) => tracing::info!(url = %server.url(), "using MCP server"),
            None => tracing::warn!("no MCP server configured, agent runs without external tools"),
        }

        let mut agent = TimedAgent::new(self.template.instructions.clone(), self.llm.clone())
            .with_pacing(self.template.pacing)
            .with_mcp_servers(servers);
        let tool_count = agent.load_tools().await?;

        let session = AgentSession::start(
            room,
            Arc::new(agent),
            self.template.models.clone(),
            self.template.options.clone(),
        );

        let job = Arc::new(Job {
            id: Uuid::new_v4(),
            identity,
            started_at: Utc::now(),
            session: Mutex::new(session),
            tool_count,
        });
        let summary = summarize(room, &job);

        {
            let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
            // A concurrent start for the same room may have won while tools loaded.
            if jobs.contains_key(room) {
                return Err(WorkerError::AlreadyRunning(room.to_string()));
            }
            jobs.insert(room.to_string(), job);
        }

        tracing::info!(room = %room, job_id = %summary.job_id, tools = tool_count, "job started");
        Ok(StartedJob {
            job: summary,
            livekit_url,
            token,
        })
    }

    pub fn jobs(&self) -> Vec<JobSummary> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        let mut summaries: Vec<_> = jobs.iter().map(|(room, job)| summarize(room, job)).collect();
        summaries.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        summaries
    }

    pub fn contains(&self, room: &str) -> bool {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(room)
    }

    /// Ends the job in `room` and removes the agent participant.
    pub async fn stop_job(&self, room: &str) -> Result<JobSummary, WorkerError> {
        let job = self
            .jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(room)
            .ok_or_else(|| WorkerError::NotFound(room.to_string()))?;

        if self.voice.is_enabled() {
            if let Err(e) = self.voice.remove_participant(room, &job.identity).await {
                tracing::warn!(room = %room, error = %e, "failed to remove agent participant");
            }
        }

        tracing::info!(room = %room, job_id = %job.id, "job stopped");
        Ok(summarize(room, &job))
    }

    /// Runs one user turn in `room` and collects the paced response.
    ///
    /// Turns in the same room are serialized.
    pub async fn run_turn(&self, room: &str, user_text: &str) -> Result<TurnOutcome, WorkerError> {
        let job = self
            .jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(room)
            .cloned()
            .ok_or_else(|| WorkerError::NotFound(room.to_string()))?;

        let mut session = job.session.lock().await;
        let mut stream = session.run_turn(user_text);

        let mut outcome = TurnOutcome {
            fragments: Vec::new(),
            narration: String::new(),
            tool_calls: 0,
            error: None,
        };
        // Fragments carrying both text and tool calls arrive twice: once
        // forwarded, once released.
        let mut forwarded_both: Vec<ResponseFragment> = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    let (text, has_tools) = match fragment.delta() {
                        Some(delta) => (delta.text().map(str::to_string), delta.has_tool_calls()),
                        None => (None, false),
                    };
                    match (text, has_tools) {
                        (Some(text), true) => {
                            if let Some(pos) = forwarded_both.iter().position(|f| *f == fragment) {
                                forwarded_both.remove(pos);
                                outcome.tool_calls += 1;
                            } else {
                                outcome.narration.push_str(&text);
                                forwarded_both.push(fragment.clone());
                            }
                        }
                        (Some(text), false) => outcome.narration.push_str(&text),
                        (None, true) => outcome.tool_calls += 1,
                        (None, false) => {}
                    }
                    outcome.fragments.push(fragment);
                }
                Err(e) => {
                    tracing::warn!(room = %room, error = %e, "turn failed");
                    outcome.error = Some(e.to_string());
                }
            }
        }

        session.record_assistant(&outcome.narration);
        Ok(outcome)
    }
}

fn summarize(room: &str, job: &Job) -> JobSummary {
    JobSummary {
        job_id: job.id,
        room: room.to_string(),
        identity: job.identity.clone(),
        started_at: job.started_at,
        tools: job.tool_count,
    }
}
