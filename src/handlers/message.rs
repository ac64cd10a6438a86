//! 소켓 메시지 라우팅
//!
//! 임시본 브로드캐스트 -> 비동기 저장 -> 확정본 브로드캐스트 순서로 처리한다.
//! 같은 방 큐를 거치므로 확정본은 항상 임시본 뒤에 도착한다.

use crate::error::{ChatError, ChatResult};
use crate::protocol::{
    ChatMessage, EventType, InboundEnvelope, MessageKind, SocketMessage, User, UserId,
};
use crate::room::{PresenceTracker, RoomRegistry};
use crate::store::ChatStore;
use std::sync::Arc;
use uuid::Uuid;

/// 히스토리 조회 기본/최대 개수
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const MAX_HISTORY_LIMIT: u32 = 100;

#[derive(Clone)]
pub struct MessageRouter {
    presence: PresenceTracker,
    rooms: RoomRegistry,
    store: Arc<dyn ChatStore>,
}

impl MessageRouter {
    pub fn new(presence: PresenceTracker, rooms: RoomRegistry, store: Arc<dyn ChatStore>) -> Self {
        Self {
            presence,
            rooms,
            store,
        }
    }

    /// 소켓 텍스트 프레임 처리
    pub async fn receive_text(&self, sender: &User, text: &str) -> ChatResult<ChatMessage> {
        let envelope: InboundEnvelope =
            serde_json::from_str(text).map_err(|e| ChatError::MalformedEnvelope(e.to_string()))?;
        self.receive(sender, envelope).await
    }

    pub async fn receive(&self, sender: &User, envelope: InboundEnvelope) -> ChatResult<ChatMessage> {
        let name = envelope
            .event
            .filter(|event| !event.is_empty())
            .ok_or_else(|| ChatError::MalformedEnvelope("missing event".into()))?;

        let event = EventType::parse_inbound(&name).ok_or_else(|| ChatError::UnsupportedEvent {
            event: name.clone(),
            recognized: EventType::recognized_inbound(),
        })?;

        let content = envelope
            .content
            .ok_or_else(|| ChatError::MalformedEnvelope("missing content".into()))?;

        match event {
            // 어시스턴트 응답 생성은 별도 생산자 몫이다. 요청 자체는 사람 메시지로 전달
            EventType::SendRegularMessage | EventType::SendAssistantChatMessage => {
                self.send_message(sender.id, content, MessageKind::Human)
                    .await
            }
            _ => Err(ChatError::UnsupportedEvent {
                event: name,
                recognized: EventType::recognized_inbound(),
            }),
        }
    }

    /// 현재 방에 메시지 전송. 반환값은 브로드캐스트된 임시본
    pub async fn send_message(
        &self,
        sender_id: UserId,
        content: String,
        kind: MessageKind,
    ) -> ChatResult<ChatMessage> {
        let room_id = self.presence.location(sender_id).await?;
        let room = self.rooms.get(room_id).await?;

        let provisional = ChatMessage::provisional(room_id, sender_id, content, kind)?;
        room.broadcast(SocketMessage::chat(provisional.clone())).await?;

        let store = self.store.clone();
        let message = provisional.clone();
        tokio::spawn(async move {
            match store.save_message(&message).await {
                Ok(saved) => {
                    let committed = ChatMessage {
                        id: message.id,
                        is_committed: true,
                        ..saved
                    };
                    if let Err(e) = room.broadcast(SocketMessage::chat(committed)).await {
                        tracing::debug!(room_id = %room_id, message_id = %message.id, error = %e, "Committed copy not delivered");
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        room_id = %room_id,
                        message_id = %message.id,
                        sender_id = sender_id,
                        error = %e,
                        "Message save failed, provisional copy stays uncommitted"
                    );
                }
            }
        });

        Ok(provisional)
    }

    /// 방 메시지 히스토리 (최신순)
    pub async fn history(
        &self,
        room_id: Uuid,
        offset: Option<u32>,
        limit: Option<u32>,
    ) -> ChatResult<Vec<ChatMessage>> {
        self.rooms.get(room_id).await?;
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        Ok(self
            .store
            .list_messages(room_id, offset.unwrap_or(0), limit)
            .await?)
    }
}
