//! 소켓 메시지 프로토콜 및 채팅 도메인 타입 정의

use crate::error::{ChatError, ChatResult, ValidationField};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 사용자 ID (인증 게이트웨이가 발급)
pub type UserId = i64;

/// 소켓 이벤트 이름
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    // Inbound
    #[serde(rename = "event_send_regular_message")]
    SendRegularMessage,
    #[serde(rename = "event_send_assistant_chat_message")]
    SendAssistantChatMessage,

    // Outbound only
    #[serde(rename = "event_room_send_message")]
    RoomSendMessage,
    #[serde(rename = "event_user_join_room")]
    UserJoinRoom,
    #[serde(rename = "event_user_left_room")]
    UserLeftRoom,
    #[serde(rename = "event_notification")]
    Notification,
    #[serde(rename = "event_greeting")]
    Greeting,
}

impl EventType {
    /// 클라이언트가 보낼 수 있는 이벤트
    pub const INBOUND: [EventType; 2] = [
        EventType::SendRegularMessage,
        EventType::SendAssistantChatMessage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendRegularMessage => "event_send_regular_message",
            Self::SendAssistantChatMessage => "event_send_assistant_chat_message",
            Self::RoomSendMessage => "event_room_send_message",
            Self::UserJoinRoom => "event_user_join_room",
            Self::UserLeftRoom => "event_user_left_room",
            Self::Notification => "event_notification",
            Self::Greeting => "event_greeting",
        }
    }

    /// 인바운드 이벤트 이름 파싱 (아웃바운드 전용 이름은 거부)
    pub fn parse_inbound(name: &str) -> Option<Self> {
        Self::INBOUND.into_iter().find(|event| event.as_str() == name)
    }

    pub fn recognized_inbound() -> Vec<&'static str> {
        Self::INBOUND.iter().map(EventType::as_str).collect()
    }
}

/// 클라이언트 → 서버 메시지 (검증 전)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundEnvelope {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// 서버 → 클라이언트 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketMessage {
    pub event: EventType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChatMessage>,
}

impl SocketMessage {
    /// 시스템 이벤트
    pub fn event(event: EventType, content: impl Into<String>) -> Self {
        Self {
            event,
            content: content.into(),
            message: None,
        }
    }

    /// 채팅 메시지 브로드캐스트
    pub fn chat(message: ChatMessage) -> Self {
        Self {
            event: EventType::RoomSendMessage,
            content: message.content.clone(),
            message: Some(message),
        }
    }
}

/// 메시지 작성 주체
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Human,
    Assistant,
}

/// 채팅 메시지 (임시본 / 확정본)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message_type: MessageKind,
    #[serde(default)]
    pub is_committed: bool,
}

impl ChatMessage {
    /// 아직 저장되지 않은 임시 메시지 생성
    pub fn provisional(
        room_id: Uuid,
        sender_id: UserId,
        content: String,
        message_type: MessageKind,
    ) -> ChatResult<Self> {
        if content.is_empty() {
            return Err(ChatError::Validation {
                field: ValidationField::Content,
                reason: "message content is required",
            });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            room_id,
            sender_id,
            content,
            created_at: Utc::now(),
            updated_at: None,
            message_type,
            is_committed: false,
        })
    }
}

/// 사용자 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub user_name: String,
}

/// 방 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    #[default]
    Public,
    Private,
}

impl RoomKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Self::Public),
            "private" => Some(Self::Private),
            _ => None,
        }
    }
}

/// 방 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSettings {
    pub id: Uuid,
    pub room_id: Uuid,
    #[serde(default)]
    pub assistant_rule: String,
    #[serde(default)]
    pub room_type: RoomKind,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

/// 영속화 계층의 방 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomRecord {
    pub id: Uuid,
    pub name: String,
    pub owner_id: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub room_type: RoomKind,
    #[serde(default)]
    pub settings: Option<RoomSettings>,
}

/// 방 생성 요청 (검증 전)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRoom {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub room_type: String,
    #[serde(default)]
    pub room_password: Option<String>,
}

/// 검증을 통과한 방 생성 요청
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomDraft {
    pub id: Uuid,
    pub name: String,
    pub owner_id: UserId,
    pub room_type: RoomKind,
    pub room_password: String,
}

impl NewRoom {
    /// 영속화 호출 전에 요청 검증
    pub fn validate(self, owner_id: UserId) -> ChatResult<RoomDraft> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ChatError::Validation {
                field: ValidationField::Name,
                reason: "room name is required",
            });
        }

        let room_type = RoomKind::parse(self.room_type.trim()).ok_or(ChatError::Validation {
            field: ValidationField::RoomType,
            reason: "room type must be one of: public, private",
        })?;

        let room_password = self
            .room_password
            .map(|password| password.trim().to_string())
            .unwrap_or_default();
        if room_type == RoomKind::Private && room_password.is_empty() {
            return Err(ChatError::Validation {
                field: ValidationField::RoomPassword,
                reason: "a private room requires a password",
            });
        }

        Ok(RoomDraft {
            id: Uuid::new_v4(),
            name,
            owner_id,
            room_type,
            room_password,
        })
    }
}

/// 방 목록 조회용 뷰
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomView {
    pub id: Uuid,
    pub number_of_people: usize,
    pub room_name: String,
    pub room_type: RoomKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_parse_rejects_outbound_names() {
        assert_eq!(
            EventType::parse_inbound("event_send_regular_message"),
            Some(EventType::SendRegularMessage)
        );
        assert_eq!(EventType::parse_inbound("event_greeting"), None);
        assert_eq!(EventType::parse_inbound("nope"), None);
    }

    #[test]
    fn chat_envelope_carries_full_message() {
        let message =
            ChatMessage::provisional(Uuid::new_v4(), 7, "hi".into(), MessageKind::Human).unwrap();
        let json = serde_json::to_value(SocketMessage::chat(message.clone())).unwrap();

        assert_eq!(json["event"], "event_room_send_message");
        assert_eq!(json["content"], "hi");
        assert_eq!(json["message"]["id"], message.id.to_string());
        assert_eq!(json["message"]["is_committed"], false);
    }

    #[test]
    fn system_event_omits_message_field() {
        let json =
            serde_json::to_value(SocketMessage::event(EventType::Greeting, "Welcome back bob"))
                .unwrap();
        assert_eq!(json["event"], "event_greeting");
        assert!(json.get("message").is_none());
    }

    #[test]
    fn empty_content_is_rejected() {
        let err = ChatMessage::provisional(Uuid::new_v4(), 1, String::new(), MessageKind::Human)
            .unwrap_err();
        assert!(matches!(
            err,
            ChatError::Validation {
                field: ValidationField::Content,
                ..
            }
        ));
    }

    #[test]
    fn private_room_without_password_is_invalid() {
        let request = NewRoom {
            name: "secret".into(),
            room_type: "private".into(),
            room_password: Some(String::new()),
        };
        let err = request.validate(1).unwrap_err();
        assert!(matches!(
            err,
            ChatError::Validation {
                field: ValidationField::RoomPassword,
                ..
            }
        ));
    }

    #[test]
    fn validation_checks_name_then_kind() {
        let err = NewRoom {
            name: "   ".into(),
            room_type: "weird".into(),
            room_password: None,
        }
        .validate(1)
        .unwrap_err();
        assert!(matches!(
            err,
            ChatError::Validation {
                field: ValidationField::Name,
                ..
            }
        ));

        let err = NewRoom {
            name: "lobby".into(),
            room_type: "weird".into(),
            room_password: None,
        }
        .validate(1)
        .unwrap_err();
        assert!(matches!(
            err,
            ChatError::Validation {
                field: ValidationField::RoomType,
                ..
            }
        ));
    }

    #[test]
    fn settings_password_is_never_serialized() {
        let settings = RoomSettings {
            id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            assistant_rule: String::new(),
            room_type: RoomKind::Private,
            password: Some("hunter2".into()),
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("hunter2"));
    }
}
