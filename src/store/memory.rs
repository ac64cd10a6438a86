//! 인메모리 영속화 구현 (개발 모드 / 테스트용)

use super::{ChatStore, StoreError};
use crate::protocol::{ChatMessage, RoomDraft, RoomRecord, RoomSettings};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    rooms: DashMap<Uuid, RoomRecord>,
    messages: DashMap<Uuid, Vec<ChatMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 기존 레코드로 초기화
    #[cfg(test)]
    pub fn with_rooms(records: impl IntoIterator<Item = RoomRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.rooms.insert(record.id, record);
        }
        store
    }

    /// 외부에서 레코드를 직접 수정 (다른 관리 도구의 변경 흉내)
    #[cfg(test)]
    pub fn put_room(&self, record: RoomRecord) {
        self.rooms.insert(record.id, record);
    }

    #[cfg(test)]
    pub fn message_count(&self, room_id: Uuid) -> usize {
        self.messages.get(&room_id).map(|m| m.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatStore for MemoryStore {
    async fn list_rooms(&self) -> Result<Vec<RoomRecord>, StoreError> {
        let mut rooms: Vec<RoomRecord> = self.rooms.iter().map(|r| r.value().clone()).collect();
        rooms.sort_by_key(|r| r.created_at);
        Ok(rooms)
    }

    async fn create_room(&self, draft: &RoomDraft) -> Result<RoomRecord, StoreError> {
        let record = RoomRecord {
            id: draft.id,
            name: draft.name.clone(),
            owner_id: draft.owner_id,
            created_at: Utc::now(),
            updated_at: None,
            is_deleted: false,
            room_type: draft.room_type,
            settings: Some(RoomSettings {
                id: Uuid::new_v4(),
                room_id: draft.id,
                assistant_rule: String::new(),
                room_type: draft.room_type,
                password: (!draft.room_password.is_empty()).then(|| draft.room_password.clone()),
            }),
        };
        self.rooms.insert(record.id, record.clone());
        Ok(record)
    }

    async fn soft_delete_room(&self, room_id: Uuid) -> Result<(), StoreError> {
        let mut record = self
            .rooms
            .get_mut(&room_id)
            .ok_or(StoreError::NotFound(room_id))?;
        record.is_deleted = true;
        record.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn get_room_settings(&self, room_id: Uuid) -> Result<RoomSettings, StoreError> {
        self.rooms
            .get(&room_id)
            .and_then(|r| r.settings.clone())
            .ok_or(StoreError::NotFound(room_id))
    }

    async fn get_room(&self, room_id: Uuid) -> Result<RoomRecord, StoreError> {
        self.rooms
            .get(&room_id)
            .map(|r| r.value().clone())
            .ok_or(StoreError::NotFound(room_id))
    }

    async fn save_message(&self, message: &ChatMessage) -> Result<ChatMessage, StoreError> {
        let stored = message.clone();
        self.messages
            .entry(message.room_id)
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn list_messages(
        &self,
        room_id: Uuid,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let Some(messages) = self.messages.get(&room_id) else {
            return Ok(Vec::new());
        };
        Ok(messages
            .iter()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .map(|mut m| {
                m.is_committed = true;
                m
            })
            .collect())
    }
}
