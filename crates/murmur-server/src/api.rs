use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use murmur_shared::constants::{APP_NAME, DEFAULT_CHAT_TITLE};
use murmur_store::{Accounts, ChatLedger, Role, Settings, SettingsUpdate, StoreError};

use crate::completion::Aggregator;
use crate::error::ServerError;
use crate::session::{self, Sessions};

#[derive(Clone)]
pub struct AppState {
    pub accounts: Accounts,
    pub ledger: ChatLedger,
    pub aggregator: Arc<Aggregator>,
    pub sessions: Sessions,
}

pub fn build_router(state: AppState) -> Router {
    // Credentials require an explicit origin, so the request origin is mirrored.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/status", get(status))
        .route("/api/toggle_mock", post(toggle_mock))
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/change_password", post(change_password))
        .route("/api/update_settings", post(update_settings))
        .route("/api/delete_account", post(delete_account))
        .route("/api/new_chat", post(new_chat))
        .route("/api/send_message", post(send_message))
        .route("/api/get_chats", get(get_chats))
        .route("/api/get_chat/:chat_id", get(get_chat))
        .route("/api/rename_chat", post(rename_chat))
        .route("/api/delete_chat", post(delete_chat))
        .route("/api/clear_chats", post(clear_chats))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    name: &'static str,
    version: &'static str,
}

/// Account as shown to its owner: everything but the password.
#[derive(Serialize)]
struct UserView<'a> {
    username: &'a str,
    #[serde(flatten)]
    settings: &'a Settings,
}

#[derive(Deserialize)]
struct CredentialsRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct PasswordRequest {
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest {
    #[serde(default, alias = "old_password")]
    old_password: String,
    #[serde(default, alias = "new_password")]
    new_password: String,
}

#[derive(Deserialize)]
struct SendMessageRequest {
    #[serde(default)]
    chat_id: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct RenameChatRequest {
    #[serde(default)]
    chat_id: String,
    #[serde(default)]
    title: String,
}

#[derive(Deserialize)]
struct ChatIdRequest {
    #[serde(default)]
    chat_id: String,
}

/// Username behind the request's session cookie.
async fn current_user(state: &AppState, headers: &HeaderMap) -> Result<String, ServerError> {
    let token = session::token_from_headers(headers).ok_or(ServerError::NotLoggedIn)?;
    state
        .sessions
        .username(token)
        .await
        .ok_or(ServerError::NotLoggedIn)
}

fn require_chat_id(chat_id: &str) -> Result<(), ServerError> {
    if chat_id.trim().is_empty() {
        return Err(ServerError::BadRequest("Chat ID is required".into()));
    }
    Ok(())
}

fn chat_not_found(e: StoreError) -> ServerError {
    match e {
        StoreError::NotFound => ServerError::NotFound("Chat not found".into()),
        other => other.into(),
    }
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        name: APP_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let report = state.aggregator.probe().await;
    Json(json!({
        "success": true,
        "mode": state.aggregator.mode(),
        "service": report,
    }))
}

async fn toggle_mock(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mode = state.aggregator.toggle_mode();
    Json(json!({
        "success": true,
        "mode": mode,
    }))
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Response, ServerError> {
    let account = state.accounts.register(&req.username, &req.password).await?;
    let token = state.sessions.start(&account.username).await;

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, session::session_cookie(&token))],
        Json(json!({
            "success": true,
            "message": "Account created",
            "user": UserView {
                username: &account.username,
                settings: &account.settings,
            },
        })),
    )
        .into_response())
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Response, ServerError> {
    let account = state
        .accounts
        .authenticate(&req.username, &req.password)
        .await?;
    let token = state.sessions.start(&account.username).await;
    info!(username = %account.username, "Logged in");

    Ok((
        [(header::SET_COOKIE, session::session_cookie(&token))],
        Json(json!({
            "success": true,
            "message": "Logged in",
            "user": UserView {
                username: &account.username,
                settings: &account.settings,
            },
        })),
    )
        .into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session::token_from_headers(&headers) {
        if let Some(username) = state.sessions.end(token).await {
            info!(username = %username, "Logged out");
        }
    }

    (
        [(header::SET_COOKIE, session::expired_cookie())],
        Json(json!({ "success": true, "message": "Logged out" })),
    )
        .into_response()
}

async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let username = current_user(&state, &headers).await?;

    match state
        .accounts
        .change_password(&username, &req.old_password, &req.new_password)
        .await
    {
        Ok(()) => Ok(Json(json!({ "success": true, "message": "Password changed" }))),
        Err(StoreError::InvalidCredentials) => {
            Err(ServerError::Unauthorized("Incorrect old password".into()))
        }
        Err(e) => Err(e.into()),
    }
}

async fn update_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let username = current_user(&state, &headers).await?;
    let settings = state.accounts.update_settings(&username, update).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Settings updated",
        "user": UserView {
            username: &username,
            settings: &settings,
        },
    })))
}

async fn delete_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<PasswordRequest>,
) -> Result<Response, ServerError> {
    let username = current_user(&state, &headers).await?;
    state.accounts.authenticate(&username, &req.password).await?;
    state.accounts.delete(&username).await?;
    state.sessions.end_all_for(&username).await;

    Ok((
        [(header::SET_COOKIE, session::expired_cookie())],
        Json(json!({ "success": true, "message": "Account deleted" })),
    )
        .into_response())
}

async fn new_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<serde_json::Value>), ServerError> {
    let username = current_user(&state, &headers).await?;
    let chat_id = state.ledger.create(&username).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "chat_id": chat_id,
            "title": DEFAULT_CHAT_TITLE,
        })),
    ))
}

async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let username = current_user(&state, &headers).await?;
    require_chat_id(&req.chat_id)?;
    if req.message.trim().is_empty() {
        return Err(ServerError::BadRequest("Message is required".into()));
    }

    // Everything that can fail goes before the user turn is stored, so a
    // chat never keeps a user turn without its reply.
    let model = state.accounts.resolved_model(&username).await?;
    let chat = state
        .ledger
        .append_turn(&username, &req.chat_id, Role::User, &req.message)
        .await?;
    let reply = state.aggregator.complete(&chat.messages, &model).await;

    let chat = state
        .ledger
        .append_turn(&username, &req.chat_id, Role::Assistant, &reply)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": chat.messages.last(),
        "title": chat.title,
        "mode": state.aggregator.mode(),
    })))
}

async fn get_chats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ServerError> {
    let username = current_user(&state, &headers).await?;
    let chats = state.ledger.list_summaries(&username).await?;
    Ok(Json(json!({ "success": true, "chats": chats })))
}

async fn get_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(chat_id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let username = current_user(&state, &headers).await?;
    let chat = state
        .ledger
        .load(&username, &chat_id)
        .await
        .map_err(chat_not_found)?;
    Ok(Json(json!({ "success": true, "chat": chat })))
}

async fn rename_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RenameChatRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let username = current_user(&state, &headers).await?;
    require_chat_id(&req.chat_id)?;
    state
        .ledger
        .rename(&username, &req.chat_id, &req.title)
        .await
        .map_err(chat_not_found)?;
    Ok(Json(json!({ "success": true, "message": "Chat renamed" })))
}

async fn delete_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatIdRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let username = current_user(&state, &headers).await?;
    require_chat_id(&req.chat_id)?;
    state.ledger.delete(&username, &req.chat_id).await?;
    Ok(Json(json!({ "success": true, "message": "Chat deleted" })))
}

async fn clear_chats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ServerError> {
    let username = current_user(&state, &headers).await?;
    let removed = state.ledger.clear_all(&username).await?;
    Ok(Json(json!({
        "success": true,
        "message": "All chats cleared",
        "removed": removed,
    })))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
