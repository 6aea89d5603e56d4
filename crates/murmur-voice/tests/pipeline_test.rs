//! End-to-end tests of the response pipeline against local mock servers.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures_util::stream::StreamExt;
use murmur_types::{ChatRole, ResponseFragment, StreamMarker, ToolSpec};
use murmur_voice::{
    AgentSession, ChatCompletionsClient, LlmConfig, McpServerHttp, SessionModels, SessionOptions,
    SpeechPacing, TimedAgent, VoiceError,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const COMPLETION_EVENTS: &str = concat!(
    ": OPENROUTER PROCESSING\n\n",
    "data: {\"id\":\"gen-1\",\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Sure, I'll \"}}]}\n\n",
    "data: {\"id\":\"gen-1\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"type\":\"function\",\"function\":{\"name\":\"check_status\",\"arguments\":\"\"}}]}}]}\n\n",
    "data: {\"id\":\"gen-1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"check that.\"}}]}\n\n",
    "data: {\"id\":\"gen-1\",\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{}\"}}]}}]}\n\n",
    "data: {\"id\":\"gen-1\",\"choices\":[],\"usage\":{\"prompt_tokens\":42,\"completion_tokens\":9,\"total_tokens\":51}}\n\n",
    "data: [DONE]\n\n",
);

#[derive(Clone, Default)]
struct Captured {
    requests: Arc<Mutex<Vec<(Option<String>, Value)>>>,
    sessions: Arc<Mutex<Vec<Option<String>>>>,
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn completions(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let auth = header_value(&headers, "authorization");
    captured.requests.lock().unwrap().push((auth.clone(), body));

    if auth.as_deref() != Some("Bearer sk-test") {
        return (StatusCode::UNAUTHORIZED, "invalid api key").into_response();
    }
    ([(header::CONTENT_TYPE, "text/event-stream")], COMPLETION_EVENTS).into_response()
}

async fn mcp(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let id = body["id"].clone();
    match body["method"].as_str().unwrap_or_default() {
        "initialize" => (
            [("mcp-session-id", "sess-1")],
            Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": "2025-03-26",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "ops", "version": "1.2.0" }
                }
            })),
        )
            .into_response(),
        "notifications/initialized" => StatusCode::ACCEPTED.into_response(),
        "tools/list" => {
            captured
                .sessions
                .lock()
                .unwrap()
                .push(header_value(&headers, "mcp-session-id"));

            if body["params"]["cursor"] == "page-2" {
                let payload = json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": { "tools": [{ "name": "list_sessions", "description": "Lists sessions" }] }
                });
                (
                    [(header::CONTENT_TYPE, "text/event-stream")],
                    format!("event: message\ndata: {}\n\n", payload),
                )
                    .into_response()
            } else {
                Json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "tools": [{
                            "name": "check_status",
                            "description": "Checks status",
                            "inputSchema": { "type": "object", "properties": {} }
                        }],
                        "nextCursor": "page-2"
                    }
                }))
                .into_response()
            }
        }
        _ => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": "method not found" }
        }))
        .into_response(),
    }
}

async fn failing_mcp(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "jsonrpc": "2.0",
        "id": body["id"],
        "error": { "code": -32603, "message": "tool registry unavailable" }
    }))
}

async fn spawn_mock() -> (String, Captured) {
    let captured = Captured::default();
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .route("/mcp", post(mcp))
        .route("/broken-mcp", post(failing_mcp))
        .with_state(captured.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), captured)
}

fn fast_pacing() -> SpeechPacing {
    SpeechPacing {
        seconds_per_word: 0.01,
        margin_seconds: 0.05,
        silent_wait_seconds: 0.05,
    }
}

fn client(base: &str, api_key: &str) -> Arc<ChatCompletionsClient> {
    let config = LlmConfig::new(format!("{}/v1", base), api_key).with_model("test/model");
    Arc::new(ChatCompletionsClient::new(config).unwrap())
}

#[tokio::test]
async fn turn_streams_text_before_tool_calls() {
    let (base, captured) = spawn_mock().await;
    let agent = TimedAgent::new("You are a helpful operator.", client(&base, "sk-test"))
        .with_pacing(fast_pacing());
    let mut session = AgentSession::start(
        "ops-room",
        Arc::new(agent),
        SessionModels::default(),
        SessionOptions::default(),
    );

    let out: Vec<ResponseFragment> = session
        .run_turn("Is the build green?")
        .map(|item| item.expect("turn should succeed"))
        .collect()
        .await;

    let texts: Vec<_> = out
        .iter()
        .filter_map(|f| f.delta().and_then(|d| d.text()))
        .collect();
    assert_eq!(texts, vec!["Sure, I'll ", "check that."]);

    let first_tool = out
        .iter()
        .position(|f| f.delta().is_some_and(|d| d.has_tool_calls()))
        .expect("tool calls should be released");
    let last_text = out
        .iter()
        .rposition(|f| f.delta().and_then(|d| d.text()).is_some())
        .unwrap();
    assert!(first_tool > last_text, "tool calls overtook narration: {:?}", out);
    assert_eq!(out.len() - first_tool, 2, "both tool deltas are released");
    assert!(out.contains(&ResponseFragment::Marker(StreamMarker::Usage(
        murmur_types::CompletionUsage {
            prompt_tokens: 42,
            completion_tokens: 9,
            total_tokens: 51,
        }
    ))));

    let requests = captured.requests.lock().unwrap();
    let (auth, body) = &requests[0];
    assert_eq!(auth.as_deref(), Some("Bearer sk-test"));
    assert_eq!(body["model"], "test/model");
    assert_eq!(body["stream"], true);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "Is the build green?");
    assert!(body.get("tools").is_none());
}

#[tokio::test]
async fn backend_rejection_surfaces_as_error() {
    let (base, _captured) = spawn_mock().await;
    let agent = TimedAgent::new("", client(&base, "sk-wrong")).with_pacing(fast_pacing());

    let out: Vec<_> = agent
        .llm_node(&murmur_types::ChatContext::default())
        .collect()
        .await;

    assert_eq!(out.len(), 1);
    match &out[0] {
        Err(VoiceError::Llm(message)) => assert!(message.contains("401"), "{}", message),
        other => panic!("expected Llm error, got {:?}", other),
    }
}

#[tokio::test]
async fn mcp_tools_are_discovered_and_offered_to_the_model() {
    let (base, captured) = spawn_mock().await;
    let server = McpServerHttp::new(format!("{}/mcp", base), Duration::from_secs(10)).unwrap();

    let preset = ToolSpec {
        name: "check_status".to_string(),
        description: "Local duplicate".to_string(),
        parameters: json!({ "type": "object" }),
    };
    let mut agent = TimedAgent::new("Operator.", client(&base, "sk-test"))
        .with_pacing(fast_pacing())
        .with_tools(vec![preset])
        .with_mcp_servers(vec![server]);

    assert_eq!(agent.mcp_servers().len(), 1);
    let count = agent.load_tools().await.unwrap();
    assert_eq!(count, 2);
    let names: Vec<_> = agent.tools().iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["check_status", "list_sessions"]);
    assert_eq!(agent.tools()[0].description, "Local duplicate");

    let sessions = captured.sessions.lock().unwrap().clone();
    assert_eq!(sessions, vec![Some("sess-1".to_string()); 2]);

    let mut session = AgentSession::start(
        "ops-room",
        Arc::new(agent),
        SessionModels::default(),
        SessionOptions::default(),
    );
    let out: Vec<_> = session.run_turn("status?").collect().await;
    assert!(out.iter().all(Result::is_ok));

    let requests = captured.requests.lock().unwrap();
    let tools = requests[0].1["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[1]["function"]["name"], "list_sessions");
}

#[tokio::test]
async fn mcp_server_error_fails_tool_loading() {
    let (base, _captured) = spawn_mock().await;
    let server =
        McpServerHttp::new(format!("{}/broken-mcp", base), Duration::from_secs(10)).unwrap();

    let info = server.initialize().await;
    match info {
        Err(VoiceError::Mcp(message)) => {
            assert!(message.contains("tool registry unavailable"), "{}", message)
        }
        other => panic!("expected Mcp error, got {:?}", other),
    }
}

#[tokio::test]
async fn session_keeps_history_between_turns() {
    let (base, captured) = spawn_mock().await;
    let agent = TimedAgent::new("Operator.", client(&base, "sk-test")).with_pacing(fast_pacing());
    let mut session = AgentSession::start(
        "ops-room",
        Arc::new(agent),
        SessionModels::default(),
        SessionOptions::default(),
    );

    assert_eq!(session.room(), "ops-room");
    assert_eq!(session.options().max_tool_steps, 10);
    assert_eq!(session.models().llm.model, "anthropic/claude-sonnet-4.5");
    assert_eq!(session.agent().instructions(), "Operator.");

    let _: Vec<_> = session.run_turn("first").collect().await;
    session.record_assistant("Sure, I'll check that.");
    let _: Vec<_> = session.run_turn("second").collect().await;

    let roles: Vec<_> = session.chat_ctx().messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![ChatRole::System, ChatRole::User, ChatRole::Assistant, ChatRole::User]
    );
    assert_eq!(captured.requests.lock().unwrap()[1].1["messages"].as_array().unwrap().len(), 4);
}
