//! 애플리케이션 상태 관리

use crate::config::Config;
use crate::handlers::MessageRouter;
use crate::room::{PresenceTracker, RoomRegistry};
use crate::session::ConnectionRegistry;
use crate::store::ChatStore;
use std::sync::Arc;

/// 전역 애플리케이션 상태
pub struct AppState {
    /// 사용자별 라이브 연결
    pub connections: ConnectionRegistry,
    /// 방 캐시
    pub rooms: RoomRegistry,
    /// 사용자 -> 현재 방
    pub presence: PresenceTracker,
    pub router: MessageRouter,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn ChatStore>) -> Self {
        let rooms = RoomRegistry::new(store.clone(), config.room.queue_capacity);
        let presence = PresenceTracker::new(rooms.clone());
        let router = MessageRouter::new(presence.clone(), rooms.clone(), store);

        Self {
            connections: ConnectionRegistry::new(),
            rooms,
            presence,
            router,
        }
    }
}
