//! Nelson server - the app's HTTP front door.
//!
//! Architecture:
//! - One `AppContext` per process, shared by every handler
//! - `/api/*` exposes the chat store as JSON
//! - Everything else is routed through the offline cache controller to the
//!   upstream origin that serves the app shell
//!
//! Endpoints:
//! - GET/PATCH /api/state - UI state and chat summaries / UI setters
//! - GET/POST /api/chats - List / create chats
//! - GET /api/chats/current - Active chat (or null)
//! - GET/PATCH/DELETE /api/chats/:id - Read / rename / delete a chat
//! - PUT /api/chats/:id/current - Make a chat active
//! - POST /api/chats/:id/messages - Append a message
//! - PATCH /api/chats/:id/messages/:message_id - Edit a message
//! - POST /api/submit - Send a user message and schedule the reply
//! - GET /api/stats - Usage summary
//! - DELETE /api/data - Clear all data
//! - GET/POST /api/install - Install prompt state / outcome
//! - GET /api/status - Connectivity and cache worker state
//! - POST /sw/message - Cache worker control channel
//! - WS /ws - Store changes and connectivity flips

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    extract::{Path, Request, State, WebSocketUpgrade},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::cache::{is_hop_by_hop, CachedResponse, ControlMessage, FetchOutcome, FetchRequest, WorkerState};
use crate::config::Config;
use crate::context::AppContext;
use crate::conversation::{submit, SubmitTarget};
use crate::install::{is_mobile, Platform, PromptOutcome};
use crate::models::{Chat, ChatMode, Citation, Message, MessageRole, Screen, UiState};
use crate::store::UsageStats;

/// File recording the port of the running server.
const PORT_FILE: &str = "server.port";

/// Largest request body forwarded upstream.
const MAX_PROXY_BODY: usize = 16 * 1024 * 1024;

// === Request/Response Types ===

/// Chat without its messages, for listings.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub mode: ChatMode,
    pub message_count: usize,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&Chat> for ChatSummary {
    fn from(chat: &Chat) -> Self {
        Self {
            id: chat.id.clone(),
            title: chat.title.clone(),
            mode: chat.mode,
            message_count: chat.messages.len(),
            created_at: chat.created_at.timestamp_millis(),
            updated_at: chat.updated_at.timestamp_millis(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub ui: UiState,
    pub chats: Vec<ChatSummary>,
}

/// Partial UI update; absent fields are left alone.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUiRequest {
    pub show_welcome: Option<bool>,
    pub selected_mode: Option<ChatMode>,
    pub current_screen: Option<Screen>,
    pub dark_mode: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateChatRequest {
    pub mode: Option<ChatMode>,
}

#[derive(Debug, Serialize)]
pub struct IdResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameChatRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct AddMessageRequest {
    pub role: MessageRole,
    pub content: String,
    pub citations: Option<Vec<Citation>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    /// Existing chat; omitted when sending from the welcome view.
    pub chat_id: Option<String>,
    pub mode: Option<ChatMode>,
    pub content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub chat_id: String,
    pub message_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallStatus {
    pub should_prompt: bool,
    pub platform: Platform,
    pub mobile: bool,
}

#[derive(Debug, Deserialize)]
pub struct InstallOutcomeRequest {
    pub outcome: PromptOutcome,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub online: bool,
    pub worker: WorkerState,
    pub clients_claimed: bool,
    pub cache_version: String,
    pub cached_entries: usize,
}

impl IntoResponse for CachedResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut response = (status, Body::from(self.body)).into_response();
        let headers = response.headers_mut();
        // Length is recomputed from the body.
        for (name, value) in &self.headers {
            if is_hop_by_hop(name) || name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }
        response
    }
}

// === Server Lifecycle ===

/// Build the router over a context.
pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/api/state", get(get_state).patch(update_ui))
        .route("/api/chats", get(list_chats).post(create_chat))
        .route("/api/chats/current", get(current_chat))
        .route(
            "/api/chats/{chat_id}",
            get(get_chat).patch(rename_chat).delete(delete_chat),
        )
        .route("/api/chats/{chat_id}/current", put(set_current_chat))
        .route("/api/chats/{chat_id}/messages", post(add_message))
        .route(
            "/api/chats/{chat_id}/messages/{message_id}",
            patch(update_message),
        )
        .route("/api/submit", post(submit_message))
        .route("/api/stats", get(get_stats))
        .route("/api/data", delete(clear_data))
        .route("/api/install", get(install_status).post(install_outcome))
        .route("/api/status", get(get_status))
        .route("/sw/message", post(worker_message))
        .route("/ws", get(websocket_handler))
        .fallback(proxy)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Start the server and run until Ctrl-C.
pub async fn start_server(config: &Config, open_browser: bool) -> Result<()> {
    let ctx = AppContext::from_config(config)?;

    // Install in the background so the listener comes up even when the
    // origin is slow or down.
    {
        let ctx = ctx.clone();
        tokio::spawn(async move { ctx.cache.install().await });
    }

    let port_file = write_port_file(config)?;

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    info!(%addr, origin = %config.origin, "Nelson server starting");

    if open_browser {
        if let Err(e) = open::that(format!("http://{addr}")) {
            warn!(error = %e, "Failed to open browser");
        }
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, router(ctx.clone()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server error")?;

    ctx.cache.settle().await;
    if let Some(path) = port_file {
        let _ = std::fs::remove_file(path);
    }
    info!("Nelson server stopped");

    Ok(())
}

fn write_port_file(config: &Config) -> Result<Option<PathBuf>> {
    if config.ephemeral {
        return Ok(None);
    }
    std::fs::create_dir_all(&config.data_dir)?;
    let path = config.data_dir.join(PORT_FILE);
    std::fs::write(&path, config.port.to_string())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(Some(path))
}

/// Port of a server started from this data directory, if one is recorded.
pub fn running_port(config: &Config) -> Option<u16> {
    std::fs::read_to_string(config.data_dir.join(PORT_FILE))
        .ok()?
        .trim()
        .parse()
        .ok()
}

// === Handlers ===

async fn get_state(State(ctx): State<Arc<AppContext>>) -> Json<StateResponse> {
    let store = ctx.store.read().await;
    Json(StateResponse {
        ui: store.ui().clone(),
        chats: store.chats().iter().map(ChatSummary::from).collect(),
    })
}

async fn update_ui(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<UpdateUiRequest>,
) -> Json<UiState> {
    let mut store = ctx.store.write().await;
    if let Some(show) = req.show_welcome {
        store.set_show_welcome(show);
    }
    if let Some(mode) = req.selected_mode {
        store.set_selected_mode(mode);
    }
    if let Some(screen) = req.current_screen {
        store.set_current_screen(screen);
    }
    if let Some(dark) = req.dark_mode {
        store.set_dark_mode(dark);
    }
    Json(store.ui().clone())
}

async fn list_chats(State(ctx): State<Arc<AppContext>>) -> Json<Vec<ChatSummary>> {
    let store = ctx.store.read().await;
    Json(store.chats().iter().map(ChatSummary::from).collect())
}

async fn create_chat(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<CreateChatRequest>,
) -> Json<IdResponse> {
    let mut store = ctx.store.write().await;
    let mode = req.mode.unwrap_or(store.ui().selected_mode);
    Json(IdResponse {
        id: store.create_chat(mode),
    })
}

async fn current_chat(State(ctx): State<Arc<AppContext>>) -> Json<Option<Chat>> {
    Json(ctx.store.read().await.current_chat().cloned())
}

async fn get_chat(
    State(ctx): State<Arc<AppContext>>,
    Path(chat_id): Path<String>,
) -> Result<Json<Chat>, StatusCode> {
    ctx.store
        .read()
        .await
        .chat(&chat_id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn rename_chat(
    State(ctx): State<Arc<AppContext>>,
    Path(chat_id): Path<String>,
    Json(req): Json<RenameChatRequest>,
) -> StatusCode {
    ctx.store.write().await.rename_chat(&chat_id, &req.title);
    StatusCode::NO_CONTENT
}

async fn delete_chat(
    State(ctx): State<Arc<AppContext>>,
    Path(chat_id): Path<String>,
) -> StatusCode {
    ctx.store.write().await.delete_chat(&chat_id);
    StatusCode::NO_CONTENT
}

async fn set_current_chat(
    State(ctx): State<Arc<AppContext>>,
    Path(chat_id): Path<String>,
) -> StatusCode {
    ctx.store.write().await.set_current_chat(&chat_id);
    StatusCode::NO_CONTENT
}

async fn add_message(
    State(ctx): State<Arc<AppContext>>,
    Path(chat_id): Path<String>,
    Json(req): Json<AddMessageRequest>,
) -> Json<IdResponse> {
    let mut message = Message::new(req.role, req.content);
    message.citations = req.citations;
    let id = message.id.clone();
    ctx.store.write().await.add_message(&chat_id, message);
    Json(IdResponse { id })
}

async fn update_message(
    State(ctx): State<Arc<AppContext>>,
    Path((chat_id, message_id)): Path<(String, String)>,
    Json(req): Json<UpdateMessageRequest>,
) -> StatusCode {
    ctx.store
        .write()
        .await
        .update_message(&chat_id, &message_id, &req.content);
    StatusCode::NO_CONTENT
}

async fn submit_message(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, StatusCode> {
    let target = match req.chat_id {
        Some(chat_id) => SubmitTarget::Existing(chat_id),
        None => {
            let mode = match req.mode {
                Some(mode) => mode,
                None => ctx.store.read().await.ui().selected_mode,
            };
            SubmitTarget::NewChat(mode)
        }
    };

    // The reply lands later and is announced over /ws.
    let submission = submit(&ctx, target, &req.content)
        .await
        .ok_or(StatusCode::UNPROCESSABLE_ENTITY)?;
    Ok(Json(SubmitResponse {
        chat_id: submission.chat_id,
        message_id: submission.message_id,
    }))
}

async fn get_stats(State(ctx): State<Arc<AppContext>>) -> Json<UsageStats> {
    Json(ctx.store.read().await.stats())
}

async fn clear_data(State(ctx): State<Arc<AppContext>>) -> StatusCode {
    ctx.clear_all().await;
    StatusCode::NO_CONTENT
}

async fn install_status(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Json<InstallStatus> {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    Json(InstallStatus {
        should_prompt: ctx.install.should_prompt(Utc::now()),
        platform: Platform::from_user_agent(user_agent),
        mobile: is_mobile(user_agent),
    })
}

async fn install_outcome(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<InstallOutcomeRequest>,
) -> StatusCode {
    ctx.install.record_outcome(req.outcome, Utc::now());
    StatusCode::NO_CONTENT
}

async fn get_status(State(ctx): State<Arc<AppContext>>) -> Json<StatusResponse> {
    let version = ctx.cache.config().version.clone();
    let cached_entries = match ctx.cache.caches().find(&version).await {
        Some(bucket) => bucket.entry_count().await,
        None => 0,
    };
    Json(StatusResponse {
        online: ctx.connectivity.is_online(),
        worker: ctx.cache.state(),
        clients_claimed: ctx.cache.clients_claimed(),
        cache_version: version,
        cached_entries,
    })
}

async fn worker_message(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    if let Some(message) = ControlMessage::from_value(&body) {
        ctx.cache.handle_message(message).await;
    }
    StatusCode::ACCEPTED
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(ctx): State<Arc<AppContext>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_websocket(socket, ctx))
}

async fn handle_websocket(mut socket: axum::extract::ws::WebSocket, ctx: Arc<AppContext>) {
    use axum::extract::ws::Message;

    let mut rx = ctx.store.read().await.subscribe();
    let mut online = ctx.connectivity.subscribe();

    loop {
        let frame = tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => serde_json::to_value(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "WebSocket client lagging, dropped events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
                let now_online = *online.borrow_and_update();
                Ok(connectivity_frame(now_online))
            }
        };
        let Ok(frame) = frame else {
            continue;
        };
        if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
            break;
        }
    }
}

/// Feed frame announcing an online/offline flip.
fn connectivity_frame(online: bool) -> serde_json::Value {
    serde_json::json!({ "type": "connectivity_changed", "online": online })
}

/// Route a non-API request through the cache controller.
async fn proxy(State(ctx): State<Arc<AppContext>>, request: Request) -> Response {
    let request = match to_fetch_request(&ctx.cache.config().origin, request).await {
        Ok(request) => request,
        Err(status) => return status.into_response(),
    };

    match ctx.cache.handle_fetch(request.clone()).await {
        FetchOutcome::Respond(response) => response.into_response(),
        FetchOutcome::Passthrough => match ctx.network.fetch(&request).await {
            Ok(response) => response.into_response(),
            Err(e) => {
                warn!(url = %request.url, error = %e, "Upstream request failed");
                StatusCode::BAD_GATEWAY.into_response()
            }
        },
    }
}

async fn to_fetch_request(origin: &str, request: Request) -> Result<FetchRequest, StatusCode> {
    let (parts, body) = request.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map_or("/", axum::http::uri::PathAndQuery::as_str);

    let headers = parts
        .headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()) && **name != header::HOST)
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body = to_bytes(body, MAX_PROXY_BODY)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;

    Ok(FetchRequest {
        method: parts.method,
        url: format!("{}{path}", origin.trim_end_matches('/')),
        headers,
        body,
    })
}
