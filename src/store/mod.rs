//! 영속화 계층 인터페이스
//!
//! 방/메시지의 영구 저장은 외부 서비스(또는 DB)가 담당한다.
//! 코어는 이 트레이트만 바라보며, 호출은 브로드캐스트와 독립적으로 실패할 수 있다.

pub mod http;
pub mod memory;

pub use http::HttpStore;
pub use memory::MemoryStore;

use crate::protocol::{ChatMessage, RoomDraft, RoomRecord, RoomSettings};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("persistence service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("record not found: {0}")]
    NotFound(Uuid),

    #[error("persistence unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn list_rooms(&self) -> Result<Vec<RoomRecord>, StoreError>;

    async fn create_room(&self, draft: &RoomDraft) -> Result<RoomRecord, StoreError>;

    async fn soft_delete_room(&self, room_id: Uuid) -> Result<(), StoreError>;

    async fn get_room_settings(&self, room_id: Uuid) -> Result<RoomSettings, StoreError>;

    async fn get_room(&self, room_id: Uuid) -> Result<RoomRecord, StoreError>;

    /// 저장된 메시지 반환 (확정 플래그는 호출자가 설정)
    async fn save_message(&self, message: &ChatMessage) -> Result<ChatMessage, StoreError>;

    /// 최신순 메시지 이력
    async fn list_messages(
        &self,
        room_id: Uuid,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, StoreError>;
}
