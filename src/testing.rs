//! 테스트 공용 헬퍼

use crate::protocol::{
    ChatMessage, RoomDraft, RoomKind, RoomRecord, RoomSettings, SocketMessage, User, UserId,
};
use crate::session::Frame;
use crate::store::{ChatStore, MemoryStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub fn user(id: UserId) -> User {
    User {
        id,
        user_name: format!("user{id}"),
    }
}

/// 공개 방 레코드
pub fn record(owner_id: UserId) -> RoomRecord {
    let id = Uuid::new_v4();
    RoomRecord {
        id,
        name: format!("room-{}", &id.to_string()[..8]),
        owner_id,
        created_at: Utc::now(),
        updated_at: None,
        is_deleted: false,
        room_type: RoomKind::Public,
        settings: Some(RoomSettings {
            id: Uuid::new_v4(),
            room_id: id,
            assistant_rule: String::new(),
            room_type: RoomKind::Public,
            password: None,
        }),
    }
}

pub async fn recv_frame(rx: &mut UnboundedReceiver<Frame>) -> Frame {
    tokio::time::timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("connection channel closed")
}

pub async fn recv_message(rx: &mut UnboundedReceiver<Frame>) -> SocketMessage {
    match recv_frame(rx).await {
        Frame::Text(text) => serde_json::from_str(&text).expect("frame is not a socket message"),
        Frame::Close => panic!("expected a message, got close"),
    }
}

pub async fn expect_close(rx: &mut UnboundedReceiver<Frame>) {
    assert_eq!(recv_frame(rx).await, Frame::Close);
}

/// 짧은 시간 동안 아무 프레임도 오지 않는지 확인
pub async fn expect_silence(rx: &mut UnboundedReceiver<Frame>) {
    let next = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(next.is_err(), "unexpected frame: {next:?}");
}

/// 호출 횟수를 세고 실패를 주입할 수 있는 저장소
pub struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
    failing_saves: AtomicBool,
    calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
            failing_saves: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn fail_all(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn fail_saves(&self) {
        self.failing_saves.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
        self.failing_saves.store(false, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatStore for FlakyStore {
    async fn list_rooms(&self) -> Result<Vec<RoomRecord>, StoreError> {
        self.check()?;
        self.inner.list_rooms().await
    }

    async fn create_room(&self, draft: &RoomDraft) -> Result<RoomRecord, StoreError> {
        self.check()?;
        self.inner.create_room(draft).await
    }

    async fn soft_delete_room(&self, room_id: Uuid) -> Result<(), StoreError> {
        self.check()?;
        self.inner.soft_delete_room(room_id).await
    }

    async fn get_room_settings(&self, room_id: Uuid) -> Result<RoomSettings, StoreError> {
        self.check()?;
        self.inner.get_room_settings(room_id).await
    }

    async fn get_room(&self, room_id: Uuid) -> Result<RoomRecord, StoreError> {
        self.check()?;
        self.inner.get_room(room_id).await
    }

    async fn save_message(&self, message: &ChatMessage) -> Result<ChatMessage, StoreError> {
        self.check()?;
        if self.failing_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected save failure".into()));
        }
        self.inner.save_message(message).await
    }

    async fn list_messages(
        &self,
        room_id: Uuid,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        self.check()?;
        self.inner.list_messages(room_id, offset, limit).await
    }
}
