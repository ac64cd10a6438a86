//! 에러 타입 정의

use crate::protocol::UserId;
use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub type ChatResult<T> = Result<T, ChatError>;

/// 검증 실패 필드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationField {
    Name,
    RoomType,
    RoomPassword,
    Content,
}

impl ValidationField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::RoomType => "room_type",
            Self::RoomPassword => "room_password",
            Self::Content => "content",
        }
    }
}

impl fmt::Display for ValidationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("room {0} not found")]
    RoomNotFound(Uuid),

    #[error("room {0} is closed")]
    RoomClosed(Uuid),

    #[error("user {0} is already joined")]
    AlreadyMember(UserId),

    #[error("user {0} is not a member of this room")]
    NotAMember(UserId),

    #[error("user {0} did not join any room")]
    NotJoined(UserId),

    #[error("target room {0} is already joined")]
    SameRoom(Uuid),

    #[error("user {user_id} is not the owner of room {room_id}")]
    NotOwner { user_id: UserId, room_id: Uuid },

    #[error("user {0} has no live connection")]
    NotConnected(UserId),

    #[error("invalid event {event:?}, please enter one of the following: {}", .recognized.join(","))]
    UnsupportedEvent {
        event: String,
        recognized: Vec<&'static str>,
    },

    #[error("invalid {field}: {reason}")]
    Validation {
        field: ValidationField,
        reason: &'static str,
    },

    #[error("invalid message format: {0}")]
    MalformedEnvelope(String),

    #[error("missing or invalid user identity")]
    Unauthenticated,

    #[error("connection closed")]
    ConnectionClosed,

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl ChatError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RoomNotFound(_) => StatusCode::NOT_FOUND,
            Self::NotOwner { .. } => StatusCode::FORBIDDEN,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::RoomClosed(_)
            | Self::AlreadyMember(_)
            | Self::NotAMember(_)
            | Self::NotJoined(_)
            | Self::SameRoom(_) => StatusCode::CONFLICT,
            Self::NotConnected(_)
            | Self::UnsupportedEvent { .. }
            | Self::Validation { .. }
            | Self::MalformedEnvelope(_) => StatusCode::BAD_REQUEST,
            Self::Persistence(_) => StatusCode::BAD_GATEWAY,
            Self::ConnectionClosed => StatusCode::GONE,
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = Json(serde_json::json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_event_lists_recognized_names() {
        let err = ChatError::UnsupportedEvent {
            event: "event_dance".into(),
            recognized: vec!["a", "b"],
        };
        assert_eq!(
            err.to_string(),
            "invalid event \"event_dance\", please enter one of the following: a,b"
        );
    }

    #[test]
    fn validation_names_the_field() {
        let err = ChatError::Validation {
            field: ValidationField::RoomPassword,
            reason: "a private room requires a password",
        };
        assert!(err.to_string().starts_with("invalid room_password"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
