//! 연결 레지스트리
//!
//! 사용자당 하나의 라이브 연결만 유지한다. 방 멤버십은 여기서 발급한
//! `Connection` 핸들의 복제본을 들고 있을 뿐, 소켓을 소유하지 않는다.

use crate::error::{ChatError, ChatResult};
use crate::protocol::{EventType, SocketMessage, UserId};
use dashmap::DashMap;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 소켓 송신 태스크로 전달되는 프레임
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
}

/// 라이브 연결 핸들
#[derive(Debug, Clone)]
pub struct Connection {
    id: Uuid,
    user_id: UserId,
    sender: UnboundedSender<Frame>,
    closed: CancellationToken,
}

impl Connection {
    /// 새 연결과 송신 태스크가 소비할 수신단 생성
    pub fn open(user_id: UserId) -> (Self, UnboundedReceiver<Frame>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connection = Self {
            id: Uuid::new_v4(),
            user_id,
            sender,
            closed: CancellationToken::new(),
        };
        (connection, receiver)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn send(&self, message: &SocketMessage) -> ChatResult<()> {
        let payload =
            serde_json::to_string(message).map_err(|e| ChatError::MalformedEnvelope(e.to_string()))?;
        self.send_text(payload)
    }

    /// 직렬화된 페이로드 그대로 전송
    pub fn send_text(&self, payload: impl Into<String>) -> ChatResult<()> {
        if self.closed.is_cancelled() {
            return Err(ChatError::ConnectionClosed);
        }
        self.sender
            .send(Frame::Text(payload.into()))
            .map_err(|_| ChatError::ConnectionClosed)
    }

    /// 연결 종료 (중복 호출 안전)
    pub fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        let _ = self.sender.send(Frame::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.sender.is_closed()
    }

    /// 종료 신호 대기 (수신 루프용)
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

/// 사용자 ID -> 연결
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<UserId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 연결 등록. 기존 연결은 닫지 않고 반환한다 (호출자 책임)
    pub fn register(&self, connection: Connection) -> Option<Connection> {
        let user_id = connection.user_id();
        let prior = self.connections.insert(user_id, connection);
        tracing::debug!(
            user_id = user_id,
            replaced = prior.is_some(),
            "Connection registered"
        );
        prior
    }

    pub fn lookup(&self, user_id: UserId) -> ChatResult<Connection> {
        self.connections
            .get(&user_id)
            .map(|c| c.value().clone())
            .ok_or(ChatError::NotConnected(user_id))
    }

    /// 연결 제거 후 종료
    pub fn remove(&self, user_id: UserId) -> ChatResult<()> {
        let (_, connection) = self
            .connections
            .remove(&user_id)
            .ok_or(ChatError::NotConnected(user_id))?;
        connection.close();
        tracing::debug!(user_id = user_id, "Connection removed");
        Ok(())
    }

    /// 같은 연결이 아직 등록돼 있을 때만 제거 (재접속한 새 연결은 유지)
    pub fn remove_if_current(&self, user_id: UserId, connection_id: Uuid) -> bool {
        match self
            .connections
            .remove_if(&user_id, |_, current| current.id() == connection_id)
        {
            Some((_, connection)) => {
                connection.close();
                true
            }
            None => false,
        }
    }

    /// 등록된 모든 연결 제거 후 종료 (프로세스 종료 시), 제거한 수 반환
    pub fn disconnect_all(&self) -> usize {
        let user_ids: Vec<UserId> = self.connections.iter().map(|entry| *entry.key()).collect();
        user_ids
            .into_iter()
            .filter(|user_id| self.remove(*user_id).is_ok())
            .count()
    }

    /// 전체 연결에 알림 전송, 전달 성공 수 반환
    pub fn broadcast_all(&self, content: &str) -> usize {
        let notice = SocketMessage::event(EventType::Notification, content);
        let mut delivered = 0;
        for entry in self.connections.iter() {
            if entry.value().is_closed() {
                continue;
            }
            match entry.value().send(&notice) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(user_id = *entry.key(), error = %e, "Notification delivery failed")
                }
            }
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }
}
