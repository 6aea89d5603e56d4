//! Client for an external MCP tool server over streamable HTTP.
//!
//! Only discovery is performed here: the handshake and `tools/list`. The
//! discovered [`ToolSpec`]s are offered to the model; executing the calls it
//! makes is left to the session runtime.

use crate::config::McpConfig;
use crate::error::VoiceError;
use crate::llm::SseDecoder;
use murmur_types::ToolSpec;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

const PROTOCOL_VERSION: &str = "2025-03-26";

const SESSION_HEADER: &str = "mcp-session-id";

/// Upper bound on `tools/list` pages followed for one server.
const MAX_TOOL_PAGES: usize = 32;

/// Identity reported by the server during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ToolsPage {
    #[serde(default)]
    tools: Vec<ToolSpec>,
    #[serde(default, rename = "nextCursor")]
    next_cursor: Option<String>,
}

#[derive(Debug)]
pub struct McpServerHttp {
    url: String,
    timeout: Duration,
    http: reqwest::Client,
    session_id: RwLock<Option<String>>,
    next_id: AtomicU64,
}

impl McpServerHttp {
    /// Creates a client whose every request is bounded by `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, VoiceError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(VoiceError::Config("MCP server url is empty".to_string()));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url,
            timeout,
            http,
            session_id: RwLock::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    /// Returns `None` when no server URL is configured.
    pub fn from_config(config: &McpConfig) -> Result<Option<Self>, VoiceError> {
        match config.url.as_deref() {
            Some(url) if !url.trim().is_empty() => {
                Self::new(url, Duration::from_secs(config.timeout_seconds)).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Performs the MCP handshake.
    pub async fn initialize(&self) -> Result<ServerInfo, VoiceError> {
        let result = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": "murmur",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
            .await?;

        let info: ServerInfo = result
            .get("serverInfo")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| VoiceError::Mcp(format!("invalid serverInfo: {}", e)))?
            .unwrap_or_default();

        self.notify("notifications/initialized").await?;
        info!(url = %self.url, server = %info.name, version = %info.version, "connected to MCP server");
        Ok(info)
    }

    /// Lists every tool the server offers, following pagination.
    pub async fn list_tools(&self) -> Result<Vec<ToolSpec>, VoiceError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_TOOL_PAGES {
            let params = match &cursor {
                Some(cursor) => json!({ "cursor": cursor }),
                None => json!({}),
            };
            let result = self.request("tools/list", params).await?;
            let page: ToolsPage = serde_json::from_value(result)
                .map_err(|e| VoiceError::Mcp(format!("invalid tools/list result: {}", e)))?;

            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => {
                    debug!(url = %self.url, count = tools.len(), "listed MCP tools");
                    return Ok(tools);
                }
            }
        }

        Err(VoiceError::Mcp(format!(
            "tools/list did not finish after {} pages",
            MAX_TOOL_PAGES
        )))
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, VoiceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self.post(&body).await?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            *self.session_id.write().await = Some(session.to_string());
        }

        let status = response.status();
        let is_event_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/event-stream"));
        let text = response.text().await?;

        if !status.is_success() {
            return Err(VoiceError::Mcp(format!(
                "{} returned {}: {}",
                method,
                status,
                text.trim()
            )));
        }

        let rpc = if is_event_stream {
            response_from_events(&text, id)?
        } else {
            serde_json::from_str::<RpcResponse>(&text)
                .map_err(|e| VoiceError::Mcp(format!("invalid {} response: {}", method, e)))?
        };

        if let Some(error) = rpc.error {
            return Err(VoiceError::Mcp(format!(
                "{} failed: {} (code {})",
                method, error.message, error.code
            )));
        }
        rpc.result
            .ok_or_else(|| VoiceError::Mcp(format!("{} response has no result", method)))
    }

    async fn notify(&self, method: &str) -> Result<(), VoiceError> {
        let body = json!({ "jsonrpc": "2.0", "method": method });
        let response = self.post(&body).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VoiceError::Mcp(format!("{} returned {}", method, status)));
        }
        Ok(())
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, VoiceError> {
        let mut request = self
            .http
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(session) = self.session_id.read().await.as_deref() {
            request = request.header(SESSION_HEADER, session);
        }
        Ok(request.send().await?)
    }
}

/// Picks the JSON-RPC response matching `id` out of an event-stream body.
fn response_from_events(body: &str, id: u64) -> Result<RpcResponse, VoiceError> {
    let mut decoder = SseDecoder::default();
    let mut payloads = decoder.push(body.as_bytes());
    payloads.extend(decoder.finish());

    payloads
        .iter()
        .filter_map(|payload| serde_json::from_str::<RpcResponse>(payload).ok())
        .find(|rpc| rpc.id.as_ref().and_then(Value::as_u64) == Some(id))
        .ok_or_else(|| VoiceError::Mcp(format!("no response for request {} in event stream", id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_url_means_no_server() {
        let config = McpConfig::default();
        assert!(McpServerHttp::from_config(&config).unwrap().is_none());

        let config = McpConfig {
            url: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(McpServerHttp::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn configured_url_uses_configured_timeout() {
        let config = McpConfig {
            url: Some("http://127.0.0.1:8000/mcp".to_string()),
            ..Default::default()
        };
        let server = McpServerHttp::from_config(&config).unwrap().unwrap();
        assert_eq!(server.timeout(), Duration::from_secs(10));
        assert_eq!(server.url(), "http://127.0.0.1:8000/mcp");
    }

    #[test]
    fn event_stream_response_is_matched_by_id() {
        let body = concat!(
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n\n",
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"tools\":[]}}\n\n",
        );
        let rpc = response_from_events(body, 7).unwrap();
        assert_eq!(rpc.result.unwrap()["tools"], json!([]));

        assert!(response_from_events(body, 8).is_err());
    }
}
