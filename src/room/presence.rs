//! 프레즌스 추적 (사용자 -> 현재 방)
//!
//! join/leave/switch 는 레지스트리 락을 잡은 채로 프레즌스 맵과 방 멤버십을
//! 함께 바꾸는 트랜잭션이다. 사용자는 어떤 순간에도 0개 또는 1개의 방에만 속한다.

use super::actor::Member;
use super::registry::{RegistryState, RoomRegistry};
use crate::error::{ChatError, ChatResult};
use crate::protocol::{User, UserId};
use crate::session::Connection;
use uuid::Uuid;

#[derive(Clone)]
pub struct PresenceTracker {
    rooms: RoomRegistry,
}

impl PresenceTracker {
    pub fn new(rooms: RoomRegistry) -> Self {
        Self { rooms }
    }

    /// 사용자의 현재 방
    pub async fn location(&self, user_id: UserId) -> ChatResult<Uuid> {
        self.rooms
            .lock()
            .await
            .presence
            .get(&user_id)
            .copied()
            .ok_or(ChatError::NotJoined(user_id))
    }

    /// 방 참여. 다른 방에 있으면 먼저 나간 뒤 참여한다
    pub async fn join_room(
        &self,
        room_id: Uuid,
        user: User,
        connection: Connection,
    ) -> ChatResult<()> {
        let mut state = self.rooms.lock().await;
        let target = state.active_room(room_id)?;
        if state.evicting.contains(&connection.id()) {
            return Err(ChatError::ConnectionClosed);
        }

        match state.presence.get(&user.id).copied() {
            Some(current) if current == room_id => return Err(ChatError::AlreadyMember(user.id)),
            Some(_) => {
                leave_locked(&mut state, user.id).await?;
            }
            None => {}
        }

        let user_id = user.id;
        target.join(connection, user).await?;
        state.presence.insert(user_id, room_id);
        Ok(())
    }

    /// 방 나가기. 해제된 연결은 등록 상태 그대로 돌려준다
    pub async fn leave_room(&self, user_id: UserId) -> ChatResult<Connection> {
        let mut state = self.rooms.lock().await;
        let member = leave_locked(&mut state, user_id).await?;
        Ok(member.connection)
    }

    /// 방 이동. 나가기 성공 후 참여가 실패하면 사용자는 어느 방에도 속하지 않는다
    pub async fn switch_room(&self, user_id: UserId, target_room_id: Uuid) -> ChatResult<()> {
        let mut state = self.rooms.lock().await;

        let current = state
            .presence
            .get(&user_id)
            .copied()
            .ok_or(ChatError::NotJoined(user_id))?;
        if current == target_room_id {
            return Err(ChatError::SameRoom(target_room_id));
        }
        let target = state.active_room(target_room_id)?;

        let member = leave_locked(&mut state, user_id).await?;
        if let Err(e) = target.join(member.connection, member.user).await {
            tracing::warn!(
                user_id = user_id,
                from = %current,
                to = %target_room_id,
                error = %e,
                "Switch left the user without a room"
            );
            return Err(e);
        }
        state.presence.insert(user_id, target_room_id);

        tracing::info!(user_id = user_id, from = %current, to = %target_room_id, "User switched room");
        Ok(())
    }

    /// 연결 종료 정리. 멤버십이 종료된 그 연결을 가리킬 때만 방에서 뺀다
    pub async fn release_connection(
        &self,
        user_id: UserId,
        connection_id: Uuid,
    ) -> ChatResult<bool> {
        let mut state = self.rooms.lock().await;
        let Some(room_id) = state.presence.get(&user_id).copied() else {
            return Ok(false);
        };
        let Some(room) = state.rooms.get(&room_id).cloned() else {
            return Ok(false);
        };
        if room.member_connection(user_id).await != Some(connection_id) {
            return Ok(false);
        }

        leave_locked(&mut state, user_id).await?;
        Ok(true)
    }
}

/// 레지스트리 락을 이미 잡은 상태에서의 나가기
async fn leave_locked(state: &mut RegistryState, user_id: UserId) -> ChatResult<Member> {
    let room_id = state
        .presence
        .get(&user_id)
        .copied()
        .ok_or(ChatError::NotJoined(user_id))?;
    let room = state
        .rooms
        .get(&room_id)
        .cloned()
        .ok_or(ChatError::RoomNotFound(room_id))?;

    let member = room.leave(user_id).await?;
    state.presence.remove(&user_id);
    Ok(member)
}
