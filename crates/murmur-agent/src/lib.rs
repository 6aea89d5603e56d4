//! Murmur agent worker.
//!
//! Accepts room jobs over HTTP, dispatches a speech-paced agent into each
//! room and runs conversation turns through it.

pub mod api;
pub mod config;
pub mod worker;

use axum::{
    routing::{delete, get, post},
    Extension, Json, Router,
};
use murmur_voice::{ChatCompletionsClient, SessionModels, VoiceError, VoiceService};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use worker::{JobTemplate, Worker};

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the worker from loaded configuration and resolved instructions.
pub fn build_worker(config: &config::Config, instructions: String) -> Result<Worker, VoiceError> {
    let llm = Arc::new(ChatCompletionsClient::new(config.llm.clone())?);
    let voice = Arc::new(VoiceService::new(config.livekit.clone()));
    let template = JobTemplate {
        agent_name: config.agent.name.clone(),
        instructions,
        models: SessionModels {
            stt: config.stt.clone(),
            llm: config.llm.clone(),
            tts: config.tts.clone(),
        },
        options: config.session.clone(),
        mcp: config.mcp.clone(),
        pacing: config.pacing,
    };
    Ok(Worker::new(template, voice, llm))
}

/// Builds the application router with all routes.
pub fn app(worker: Arc<Worker>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/jobs",
            post(api::start_job_handler).get(api::list_jobs_handler),
        )
        .route("/jobs/{room}", delete(api::stop_job_handler))
        .route("/jobs/{room}/turns", post(api::turn_handler))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(worker))
}
