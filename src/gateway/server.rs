//! HTTP / WebSocket 网关（axum）
//!
//! - `GET /ws?session_id=..`：双向 WebSocket，推送研究过程事件
//! - `POST /api/chat`、`GET /api/sources/:id`、`GET /api/notes/:id`、`POST /api/reset/:id`、
//!   `DELETE /api/sessions/:id`、`GET /api/health`

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::message::{parse_client_message, ClientMessage, ControlMessage, ServerMessage};
use super::session::SessionRegistry;
use crate::research::{ResearchEvent, TurnOutcome};

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "success": false, "error": message })))
}

fn not_found(session_id: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, &format!("Unknown session: {}", session_id))
}

/// 构建网关路由
pub fn router(registry: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/chat", post(api_chat))
        .route("/api/sources/:session_id", get(api_sources))
        .route("/api/notes/:session_id", get(api_notes))
        .route("/api/reset/:session_id", post(api_reset))
        .route("/api/sessions/:session_id", delete(api_delete_session))
        .route("/api/health", get(api_health))
        .with_state(registry)
}

/// 后台定期回收过期会话
fn spawn_session_sweeper(registry: Arc<SessionRegistry>) -> tokio::task::JoinHandle<()> {
    let period = (registry.session_timeout() / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            registry.cleanup_expired().await;
        }
    })
}

/// 监听并服务，直到进程退出
pub async fn serve(addr: &str, registry: Arc<SessionRegistry>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let sweeper = spawn_session_sweeper(registry.clone());
    tracing::info!("Research gateway listening on http://{}", addr);
    let served = axum::serve(listener, router(registry)).await;
    sweeper.abort();
    served?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    session_id: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(registry): State<Arc<SessionRegistry>>,
) -> Response {
    let session_id = query
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(SessionRegistry::new_session_id);
    ws.on_upgrade(move |socket| handle_socket(socket, registry, session_id))
}

async fn handle_socket(socket: WebSocket, registry: Arc<SessionRegistry>, session_id: String) {
    tracing::info!(session_id = %session_id, "WebSocket connected");
    let (mut sink, mut stream) = socket.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ResearchEvent>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if sink.send(WsMessage::Text(msg.to_json())).await.is_err() {
                break;
            }
        }
    });
    let forward_tx = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if forward_tx.send(event.into()).is_err() {
                break;
            }
        }
    });

    let _ = out_tx.send(
        ControlMessage::Connected {
            session_id: session_id.clone(),
        }
        .into(),
    );

    while let Some(incoming) = stream.next().await {
        let text = match incoming {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "WebSocket receive error");
                break;
            }
        };
        match parse_client_message(&text) {
            Ok(ClientMessage::Chat { message }) => {
                let message = message.trim();
                if message.is_empty() {
                    let _ = out_tx.send(ServerMessage::error("Empty message"));
                    continue;
                }
                let session = registry.get_or_create(&session_id).await;
                let mut orchestrator = session.lock().await;
                orchestrator.run_turn(message, Some(&event_tx)).await;
            }
            Ok(ClientMessage::Reset) => {
                registry.get_or_create(&session_id).await.lock().await.reset();
                let _ = out_tx.send(
                    ControlMessage::Cleared {
                        session_id: session_id.clone(),
                    }
                    .into(),
                );
            }
            Ok(ClientMessage::Ping) => {
                let _ = out_tx.send(ControlMessage::Pong.into());
            }
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "malformed inbound message");
                let _ = out_tx.send(ServerMessage::error(e));
            }
        }
    }

    drop(event_tx);
    drop(out_tx);
    let _ = forwarder.await;
    let _ = writer.await;
    tracing::info!(session_id = %session_id, "WebSocket closed");
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    session_id: Option<String>,
    message: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    session_id: String,
    #[serde(flatten)]
    outcome: TurnOutcome,
}

async fn api_chat(
    State(registry): State<Arc<SessionRegistry>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Empty message"));
    }
    let session_id = req
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(SessionRegistry::new_session_id);
    let session = registry.get_or_create(&session_id).await;
    let outcome = session.lock().await.run_turn(message, None).await;
    Ok(Json(ChatResponse { session_id, outcome }))
}

async fn api_sources(
    State(registry): State<Arc<SessionRegistry>>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(&session_id).await.ok_or_else(|| not_found(&session_id))?;
    let orchestrator = session.lock().await;
    let sources = serde_json::to_value(orchestrator.state().sources.all())
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
    Ok(Json(json!({ "session_id": session_id, "sources": sources })))
}

async fn api_notes(
    State(registry): State<Arc<SessionRegistry>>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = registry.get(&session_id).await.ok_or_else(|| not_found(&session_id))?;
    let orchestrator = session.lock().await;
    let notes = serde_json::to_value(orchestrator.state().notes.all())
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;
    Ok(Json(json!({ "session_id": session_id, "notes": notes })))
}

async fn api_reset(
    State(registry): State<Arc<SessionRegistry>>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !registry.reset(&session_id).await {
        return Err(not_found(&session_id));
    }
    Ok(Json(json!({ "success": true, "message": "Conversation reset" })))
}

async fn api_delete_session(
    State(registry): State<Arc<SessionRegistry>>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if registry.remove(&session_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&session_id))
    }
}

async fn api_health(State(registry): State<Arc<SessionRegistry>>) -> Json<Value> {
    let components = registry.components();
    let (prompt, completion, total) = components.llm.token_usage();
    Json(json!({
        "status": "ok",
        "model": components.llm.model_name(),
        "protocol": components.strategy.version,
        "sessions": registry.len().await,
        "token_usage": {
            "prompt_tokens": prompt,
            "completion_tokens": completion,
            "total_tokens": total,
        },
    }))
}
