//! HTTP entry point. Platform bridges POST normalised events here and get
//! the turn report back; replies travel through the gateways.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::engine::{ConversationContext, Engine, InboundEvent, TurnReport};
use crate::error::{EngineError, Result};
use crate::messaging::PlatformType;

#[derive(Debug, Deserialize)]
pub struct IncomingEvent {
    pub platform: String,
    pub channel: String,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub skill: Option<String>,
    /// Text, or the platform's structured payload (location, postback).
    pub value: Value,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl From<IncomingEvent> for InboundEvent {
    fn from(body: IncomingEvent) -> Self {
        let mut event = InboundEvent::new(PlatformType::from_name(&body.platform), body.channel, body.value);
        event.session = body.session;
        event.skill = body.skill;
        event.parameters = body.parameters;
        event
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub skills: Vec<String>,
    pub sessions: usize,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorBody { error: error.into() }))
}

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/webhook", post(incoming))
        .route("/health", get(health))
        .route("/sessions/{key}", get(session).delete(expire_session))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// HTTP status for a failed turn.
pub fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::SkillNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Delivery(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ---------------------------------------------------------------------------
// POST /webhook
// ---------------------------------------------------------------------------

pub async fn incoming(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<IncomingEvent>,
) -> std::result::Result<Json<TurnReport>, ApiError> {
    info!(platform = %body.platform, channel = %body.channel, "incoming event");
    let event = InboundEvent::from(body);
    match engine.handle(&event).await {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            warn!(session = %event.session_key(), err = %e, "event rejected");
            Err(api_error(status_for(&e), e.to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

pub async fn health(State(engine): State<Arc<Engine>>) -> Json<Health> {
    Json(Health {
        status: "ok",
        skills: engine.skills().ids().into_iter().map(String::from).collect(),
        sessions: engine.sessions().len().await,
    })
}

// ---------------------------------------------------------------------------
// GET / DELETE /sessions/{key}
// ---------------------------------------------------------------------------

pub async fn session(
    State(engine): State<Arc<Engine>>,
    Path(key): Path<String>,
) -> std::result::Result<Json<ConversationContext>, ApiError> {
    engine
        .sessions()
        .snapshot(&key)
        .await
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("no session {key}")))
}

/// Expire a session; its next event starts from scratch.
pub async fn expire_session(
    State(engine): State<Arc<Engine>>,
    Path(key): Path<String>,
) -> std::result::Result<StatusCode, ApiError> {
    if engine.sessions().remove(&key).await {
        info!(session = %key, "session expired");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(api_error(StatusCode::NOT_FOUND, format!("no session {key}")))
    }
}

pub async fn serve(engine: Arc<Engine>, bind: &str, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| EngineError::Config(format!("failed to bind {bind}: {e}")))?;

    info!(bind = %bind, "webhook listening");

    axum::serve(listener, router(engine))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
        .map_err(|e| EngineError::Config(format!("webhook server error: {e}")))?;

    Ok(())
}
