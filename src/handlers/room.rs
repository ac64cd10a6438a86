//! 방 관리 HTTP 핸들러

use crate::error::{ChatError, ChatResult, ValidationField};
use crate::protocol::{
    ChatMessage, MessageKind, NewRoom, RoomRecord, RoomSettings, RoomView, User, UserId,
};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct JoinRoomRequest {
    pub room_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct SwitchRoomRequest {
    pub target_room_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct NotificationRequest {
    #[serde(default)]
    pub content: String,
}

/// 본문의 다른 필드(room_id 등)는 무시한다
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(rename = "message_offset")]
    pub offset: Option<u32>,
    #[serde(rename = "message_limit")]
    pub limit: Option<u32>,
}

/// 사용자의 현재 방
#[derive(Debug, Serialize, Deserialize)]
pub struct LocationResponse {
    pub user_id: UserId,
    pub room_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub delivered: usize,
}

pub async fn list_rooms(State(state): State<Arc<AppState>>, _user: User) -> Json<Vec<RoomView>> {
    Json(state.rooms.list_views().await)
}

pub async fn create_room(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(request): Json<NewRoom>,
) -> ChatResult<(StatusCode, Json<RoomRecord>)> {
    let record = state.rooms.create(user.id, request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn delete_room(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(room_id): Path<Uuid>,
) -> ChatResult<StatusCode> {
    state.rooms.delete(room_id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn room_settings(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(room_id): Path<Uuid>,
) -> ChatResult<Json<RoomSettings>> {
    Ok(Json(state.rooms.settings(room_id).await?))
}

/// 방 참여 (라이브 소켓 연결 필요)
pub async fn join_room(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(request): Json<JoinRoomRequest>,
) -> ChatResult<Json<LocationResponse>> {
    let connection = state.connections.lookup(user.id)?;
    let user_id = user.id;
    state
        .presence
        .join_room(request.room_id, user, connection)
        .await?;

    tracing::info!(user_id = user_id, room_id = %request.room_id, "User joined room");
    Ok(Json(LocationResponse {
        user_id,
        room_id: request.room_id,
    }))
}

pub async fn leave_room(
    State(state): State<Arc<AppState>>,
    user: User,
) -> ChatResult<StatusCode> {
    state.presence.leave_room(user.id).await?;
    tracing::info!(user_id = user.id, "User left room");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn switch_room(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(request): Json<SwitchRoomRequest>,
) -> ChatResult<Json<LocationResponse>> {
    state
        .presence
        .switch_room(user.id, request.target_room_id)
        .await?;
    Ok(Json(LocationResponse {
        user_id: user.id,
        room_id: request.target_room_id,
    }))
}

pub async fn user_location(
    State(state): State<Arc<AppState>>,
    user: User,
) -> ChatResult<Json<LocationResponse>> {
    let room_id = state.presence.location(user.id).await?;
    Ok(Json(LocationResponse {
        user_id: user.id,
        room_id,
    }))
}

pub async fn chat_messages(
    State(state): State<Arc<AppState>>,
    _user: User,
    Path(room_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> ChatResult<Json<Vec<ChatMessage>>> {
    let messages = state
        .router
        .history(room_id, query.offset, query.limit)
        .await?;
    Ok(Json(messages))
}

/// 현재 방으로 메시지 전송. 대상 방은 요청자의 위치로 정해지며 임시 사본을 돌려준다
pub async fn send_chat_message(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(request): Json<SendMessageRequest>,
) -> ChatResult<Json<ChatMessage>> {
    let message = state
        .router
        .send_message(user.id, request.content, MessageKind::Human)
        .await?;
    Ok(Json(message))
}

/// 전체 연결 대상 공지
pub async fn send_notification(
    State(state): State<Arc<AppState>>,
    _user: User,
    Json(request): Json<NotificationRequest>,
) -> ChatResult<Json<NotificationResponse>> {
    if request.content.trim().is_empty() {
        return Err(ChatError::Validation {
            field: ValidationField::Content,
            reason: "notification content is required",
        });
    }
    let delivered = super::connection::send_notification(&state, &request.content);
    Ok(Json(NotificationResponse { delivered }))
}
