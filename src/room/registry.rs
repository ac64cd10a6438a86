//! 방 레지스트리 (인메모리 캐시)
//!
//! 방 캐시와 프레즌스 맵은 하나의 락(레지스트리 락)으로 함께 보호한다.
//! 영속화 호출이나 방 종료 절차 동안에는 절대 락을 잡고 있지 않는다.

use super::actor::Room;
use crate::error::{ChatError, ChatResult};
use crate::protocol::{NewRoom, RoomRecord, RoomSettings, RoomView, UserId};
use crate::store::ChatStore;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// 레지스트리 락이 보호하는 상태
#[derive(Default)]
pub struct RegistryState {
    pub(crate) rooms: HashMap<Uuid, Arc<Room>>,
    pub(crate) presence: HashMap<UserId, Uuid>,
    /// 삭제 중인 방에서 분리되어 종료를 기다리는 연결 ID
    pub(crate) evicting: HashSet<Uuid>,
}

impl RegistryState {
    /// 서비스 가능한(Active) 방 조회
    pub(crate) fn active_room(&self, room_id: Uuid) -> ChatResult<Arc<Room>> {
        self.rooms
            .get(&room_id)
            .filter(|room| room.is_active())
            .cloned()
            .ok_or(ChatError::RoomNotFound(room_id))
    }
}

#[derive(Clone)]
pub struct RoomRegistry {
    state: Arc<Mutex<RegistryState>>,
    store: Arc<dyn ChatStore>,
    queue_capacity: usize,
}

impl RoomRegistry {
    pub fn new(store: Arc<dyn ChatStore>, queue_capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState::default())),
            store,
            queue_capacity,
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().await
    }

    /// 시작 시 삭제되지 않은 모든 방 적재
    pub async fn load_all(&self) -> ChatResult<usize> {
        let records = self.store.list_rooms().await?;

        let mut state = self.lock().await;
        let mut loaded = 0;
        for record in records.into_iter().filter(|r| !r.is_deleted) {
            if state.rooms.contains_key(&record.id) {
                continue;
            }
            let room = Room::spawn(record, self.queue_capacity);
            state.rooms.insert(room.id(), room);
            loaded += 1;
        }

        tracing::info!(rooms = loaded, "Rooms loaded from persistence");
        Ok(loaded)
    }

    /// 캐시에서만 조회 (영속화 계층은 건드리지 않음)
    pub async fn get(&self, room_id: Uuid) -> ChatResult<Arc<Room>> {
        self.lock().await.active_room(room_id)
    }

    pub async fn list_views(&self) -> Vec<RoomView> {
        let rooms: Vec<Arc<Room>> = {
            let state = self.lock().await;
            state
                .rooms
                .values()
                .filter(|room| room.is_active())
                .cloned()
                .collect()
        };

        let mut views = Vec::with_capacity(rooms.len());
        for room in rooms {
            views.push(room.view().await);
        }
        views.sort_by(|a, b| a.room_name.cmp(&b.room_name));
        views
    }

    /// 방 생성: 검증 -> 영속화 -> 캐시 등록 -> 비동기 갱신
    pub async fn create(&self, owner_id: UserId, request: NewRoom) -> ChatResult<RoomRecord> {
        let draft = request.validate(owner_id)?;
        let record = self.store.create_room(&draft).await?;

        let room = Room::spawn(record.clone(), self.queue_capacity);
        self.lock().await.rooms.insert(record.id, room);

        tracing::info!(room_id = %record.id, owner_id = owner_id, name = %record.name, "Room created");

        let registry = self.clone();
        let room_id = record.id;
        tokio::spawn(async move {
            if let Err(e) = registry.refresh(room_id).await {
                tracing::warn!(room_id = %room_id, error = %e, "Post-create refresh failed");
            }
        });

        Ok(record)
    }

    /// 방 삭제. 메모리상 종료는 항상 수행하고, 캐시 제거는 영속화 성공 후에만.
    /// 명단 분리와 프레즌스 정리는 같은 락 구간에서 일어난다
    pub async fn delete(&self, room_id: Uuid, requester: UserId) -> ChatResult<()> {
        let (room, detached) = {
            let mut state = self.lock().await;
            let room = state
                .rooms
                .get(&room_id)
                .cloned()
                .ok_or(ChatError::RoomNotFound(room_id))?;

            if room.owner_id().await != requester {
                return Err(ChatError::NotOwner {
                    user_id: requester,
                    room_id,
                });
            }

            let detached: Vec<Uuid> = room
                .begin_shutdown()
                .await
                .unwrap_or_default()
                .iter()
                .map(|member| member.connection.id())
                .collect();
            state.evicting.extend(detached.iter().copied());

            let before = state.presence.len();
            state.presence.retain(|_, current| *current != room_id);
            tracing::debug!(
                room_id = %room_id,
                released = before - state.presence.len(),
                "Presence cleared for deleted room"
            );
            (room, detached)
        };

        room.shutdown().await;

        // 이 시점에는 분리된 연결이 모두 닫혀 있다
        {
            let mut state = self.lock().await;
            for connection_id in &detached {
                state.evicting.remove(connection_id);
            }
        }

        self.store.soft_delete_room(room_id).await.map_err(|e| {
            tracing::warn!(room_id = %room_id, error = %e, "Soft delete failed, room kept in cache as closed");
            e
        })?;

        self.lock().await.rooms.remove(&room_id);
        tracing::info!(room_id = %room_id, requester = requester, "Room deleted");
        Ok(())
    }

    /// 영속화 계층의 최신 레코드로 설명 속성 갱신
    pub async fn refresh(&self, room_id: Uuid) -> ChatResult<()> {
        let record = self.store.get_room(room_id).await?;
        let room = self
            .lock()
            .await
            .rooms
            .get(&room_id)
            .cloned()
            .ok_or(ChatError::RoomNotFound(room_id))?;
        room.apply_record(record).await;
        Ok(())
    }

    pub async fn settings(&self, room_id: Uuid) -> ChatResult<RoomSettings> {
        self.get(room_id).await?;
        Ok(self.store.get_room_settings(room_id).await?)
    }

    /// 프로세스 종료 시 모든 방 정리 (영속화 호출 없음)
    pub async fn shutdown_all(&self) {
        let rooms: Vec<Arc<Room>> = {
            let mut state = self.lock().await;
            state.presence.clear();
            let rooms: Vec<Arc<Room>> = state.rooms.drain().map(|(_, room)| room).collect();
            for room in &rooms {
                room.begin_shutdown().await;
            }
            rooms
        };
        let count = rooms.len();
        join_all(rooms.iter().map(|room| room.shutdown())).await;
        tracing::info!(rooms = count, "All rooms shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationField;
    use crate::protocol::{EventType, RoomKind};
    use crate::room::RoomState;
    use crate::session::Connection;
    use crate::store::MemoryStore;
    use crate::testing::{expect_close, record, recv_message, user, FlakyStore};
    use std::time::Duration;

    fn registry_with(records: Vec<RoomRecord>) -> (RoomRegistry, Arc<FlakyStore>) {
        let store = Arc::new(FlakyStore::new(MemoryStore::with_rooms(records)));
        (RoomRegistry::new(store.clone(), 16), store)
    }

    #[tokio::test]
    async fn load_all_skips_soft_deleted_rooms() {
        let live = record(1);
        let mut gone = record(1);
        gone.is_deleted = true;
        let (registry, _) = registry_with(vec![live.clone(), gone.clone()]);

        assert_eq!(registry.load_all().await.unwrap(), 1);
        assert!(registry.get(live.id).await.is_ok());
        assert!(matches!(
            registry.get(gone.id).await,
            Err(ChatError::RoomNotFound(_))
        ));
    }

    #[tokio::test]
    async fn load_all_surfaces_persistence_failure() {
        let (registry, store) = registry_with(vec![record(1)]);
        store.fail_all();
        assert!(matches!(
            registry.load_all().await,
            Err(ChatError::Persistence(_))
        ));
    }

    #[tokio::test]
    async fn private_room_without_secret_never_reaches_persistence() {
        let (registry, store) = registry_with(vec![]);
        let request = NewRoom {
            name: "vault".into(),
            room_type: "private".into(),
            room_password: None,
        };

        let err = registry.create(1, request).await.unwrap_err();
        assert!(matches!(
            err,
            ChatError::Validation {
                field: ValidationField::RoomPassword,
                ..
            }
        ));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn private_room_with_blank_secret_never_reaches_persistence() {
        let (registry, store) = registry_with(vec![]);
        let request = NewRoom {
            name: "vault".into(),
            room_type: "private".into(),
            room_password: Some("   ".into()),
        };

        let err = registry.create(1, request).await.unwrap_err();
        assert!(matches!(
            err,
            ChatError::Validation {
                field: ValidationField::RoomPassword,
                ..
            }
        ));
        assert_eq!(store.calls(), 0);
        assert!(registry.list_views().await.is_empty());
    }

    #[tokio::test]
    async fn create_caches_an_active_room() {
        let (registry, _) = registry_with(vec![]);
        let record = registry
            .create(
                4,
                NewRoom {
                    name: " general ".into(),
                    room_type: "public".into(),
                    room_password: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(record.name, "general");
        assert_eq!(record.owner_id, 4);
        let room = registry.get(record.id).await.unwrap();
        assert!(room.is_active());

        let views = registry.list_views().await;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].room_type, RoomKind::Public);
    }

    #[tokio::test]
    async fn create_surfaces_persistence_errors() {
        let (registry, store) = registry_with(vec![]);
        store.fail_all();
        let err = registry
            .create(
                1,
                NewRoom {
                    name: "general".into(),
                    room_type: "public".into(),
                    room_password: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Persistence(_)));
        assert!(registry.list_views().await.is_empty());
    }

    #[tokio::test]
    async fn only_owner_may_delete() {
        let room_record = record(7);
        let (registry, _) = registry_with(vec![room_record.clone()]);
        registry.load_all().await.unwrap();

        assert!(matches!(
            registry.delete(room_record.id, 8).await,
            Err(ChatError::NotOwner { user_id: 8, .. })
        ));
        assert!(registry.get(room_record.id).await.is_ok());
    }

    #[tokio::test]
    async fn delete_tears_down_members_and_evicts() {
        let room_record = record(1);
        let (registry, store) = registry_with(vec![room_record.clone()]);
        registry.load_all().await.unwrap();
        let room = registry.get(room_record.id).await.unwrap();

        let (alice, mut alice_rx) = Connection::open(10);
        let (bob, mut bob_rx) = Connection::open(11);
        {
            let mut state = registry.lock().await;
            room.join(alice.clone(), user(10)).await.unwrap();
            room.join(bob.clone(), user(11)).await.unwrap();
            state.presence.insert(10, room_record.id);
            state.presence.insert(11, room_record.id);
        }

        registry.delete(room_record.id, 1).await.unwrap();

        for rx in [&mut alice_rx, &mut bob_rx] {
            let notice = loop {
                let message = recv_message(rx).await;
                if message.event == EventType::Notification {
                    break message;
                }
            };
            assert!(notice.content.contains("has been closed"));
            expect_close(rx).await;
        }
        assert!(alice.is_closed() && bob.is_closed());
        assert!(matches!(
            registry.get(room_record.id).await,
            Err(ChatError::RoomNotFound(_))
        ));
        assert!(registry.lock().await.presence.is_empty());
        assert!(store.inner().get_room(room_record.id).await.unwrap().is_deleted);
    }

    #[tokio::test]
    async fn failed_soft_delete_still_tears_down_but_keeps_entry() {
        let room_record = record(1);
        let (registry, store) = registry_with(vec![room_record.clone()]);
        registry.load_all().await.unwrap();
        let room = registry.get(room_record.id).await.unwrap();
        let (conn, mut rx) = Connection::open(3);
        room.join(conn, user(3)).await.unwrap();
        recv_message(&mut rx).await;

        store.fail_all();
        assert!(matches!(
            registry.delete(room_record.id, 1).await,
            Err(ChatError::Persistence(_))
        ));

        assert_eq!(room.state(), RoomState::Closed);
        recv_message(&mut rx).await;
        expect_close(&mut rx).await;
        assert!(registry.get(room_record.id).await.is_err());
        assert!(registry.lock().await.rooms.contains_key(&room_record.id));

        store.recover();
        registry.delete(room_record.id, 1).await.unwrap();
        assert!(!registry.lock().await.rooms.contains_key(&room_record.id));
    }

    #[tokio::test]
    async fn refresh_updates_description_only() {
        let room_record = record(1);
        let (registry, store) = registry_with(vec![room_record.clone()]);
        registry.load_all().await.unwrap();
        let room = registry.get(room_record.id).await.unwrap();
        let (conn, _rx) = Connection::open(2);
        room.join(conn, user(2)).await.unwrap();

        let mut renamed = room_record.clone();
        renamed.name = "after".into();
        store.inner().put_room(renamed);

        registry.refresh(room_record.id).await.unwrap();
        assert_eq!(room.record().await.name, "after");
        assert!(room.is_member(2).await);
        assert!(room.is_active());
    }

    #[tokio::test]
    async fn create_schedules_refresh() {
        let (registry, store) = registry_with(vec![]);
        let created = registry
            .create(
                1,
                NewRoom {
                    name: "draft".into(),
                    room_type: "public".into(),
                    room_password: None,
                },
            )
            .await
            .unwrap();

        // create + get_room
        tokio::time::timeout(Duration::from_secs(1), async {
            while store.calls() < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("refresh was never issued");
        assert!(registry.get(created.id).await.is_ok());
    }

    #[tokio::test]
    async fn settings_require_cached_room() {
        let room_record = record(1);
        let (registry, _) = registry_with(vec![room_record.clone()]);
        registry.load_all().await.unwrap();

        let settings = registry.settings(room_record.id).await.unwrap();
        assert_eq!(settings.room_id, room_record.id);
        assert!(matches!(
            registry.settings(Uuid::new_v4()).await,
            Err(ChatError::RoomNotFound(_))
        ));
    }

    #[tokio::test]
    async fn shutdown_all_closes_every_room() {
        let (registry, _) = registry_with(vec![record(1), record(2)]);
        registry.load_all().await.unwrap();
        let rooms: Vec<_> = registry.lock().await.rooms.values().cloned().collect();

        registry.shutdown_all().await;

        assert!(rooms.iter().all(|r| r.state() == RoomState::Closed));
        assert!(registry.list_views().await.is_empty());
    }
}
