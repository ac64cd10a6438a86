//! 방 브로드캐스트 액터
//!
//! 방마다 하나의 소비자 태스크가 큐를 비우며 멤버들에게 순서대로 전송한다.
//! 호출자는 큐에 넣기만 하고, 팬아웃은 소비자 태스크만 수행한다.
//!
//! 상태 전이: `Active` -> `ShuttingDown` -> `Closed` (역전이 없음)

use crate::error::{ChatError, ChatResult};
use crate::protocol::{EventType, RoomRecord, RoomView, SocketMessage, User, UserId};
use crate::session::Connection;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 방 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Active,
    ShuttingDown,
    Closed,
}

impl RoomState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Active,
            1 => Self::ShuttingDown,
            _ => Self::Closed,
        }
    }
}

/// 방 멤버 (연결은 레지스트리 소유, 여기서는 핸들만 보관)
#[derive(Debug, Clone)]
pub struct Member {
    pub user: User,
    pub connection: Connection,
}

type Members = Arc<Mutex<HashMap<UserId, Member>>>;

pub struct Room {
    id: Uuid,
    record: RwLock<RoomRecord>,
    members: Members,
    member_count: AtomicUsize,
    queue: mpsc::Sender<SocketMessage>,
    cancel: CancellationToken,
    state: AtomicU8,
    /// 소비자 태스크 핸들. 종료 절차 전체 동안 잠겨 있어 중복 종료를 직렬화한다
    consumer: Mutex<Option<JoinHandle<()>>>,
    /// 종료 1단계에서 명단에서 떼어낸 멤버 (2단계에서 알림 후 종료)
    evicted: Mutex<Vec<Member>>,
}

impl Room {
    /// 방 생성 및 소비자 태스크 시작
    pub fn spawn(record: RoomRecord, queue_capacity: usize) -> Arc<Self> {
        let (queue, receiver) = mpsc::channel(queue_capacity.max(1));
        let members: Members = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_consumer(
            record.id,
            receiver,
            members.clone(),
            cancel.clone(),
        ));

        tracing::info!(room_id = %record.id, name = %record.name, "Room started");

        Arc::new(Self {
            id: record.id,
            record: RwLock::new(record),
            members,
            member_count: AtomicUsize::new(0),
            queue,
            cancel,
            state: AtomicU8::new(RoomState::Active as u8),
            consumer: Mutex::new(Some(handle)),
            evicted: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> RoomState {
        RoomState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_active(&self) -> bool {
        self.state() == RoomState::Active
    }

    pub fn member_count(&self) -> usize {
        self.member_count.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub async fn record(&self) -> RoomRecord {
        self.record.read().await.clone()
    }

    pub async fn owner_id(&self) -> UserId {
        self.record.read().await.owner_id
    }

    pub async fn view(&self) -> RoomView {
        let record = self.record.read().await;
        RoomView {
            id: self.id,
            number_of_people: self.member_count(),
            room_name: record.name.clone(),
            room_type: record.room_type,
        }
    }

    #[cfg(test)]
    pub async fn member_ids(&self) -> Vec<UserId> {
        self.members.lock().await.keys().copied().collect()
    }

    #[cfg(test)]
    pub async fn is_member(&self, user_id: UserId) -> bool {
        self.members.lock().await.contains_key(&user_id)
    }

    /// 현재 멤버의 연결 ID
    pub async fn member_connection(&self, user_id: UserId) -> Option<Uuid> {
        self.members
            .lock()
            .await
            .get(&user_id)
            .map(|m| m.connection.id())
    }

    fn ensure_active(&self) -> ChatResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(ChatError::RoomClosed(self.id))
        }
    }

    /// 방 참여. 닫힌 연결로는 참여할 수 없다
    pub async fn join(&self, connection: Connection, user: User) -> ChatResult<()> {
        self.ensure_active()?;
        if connection.is_closed() {
            return Err(ChatError::ConnectionClosed);
        }

        let user_name = user.user_name.clone();
        {
            let mut members = self.members.lock().await;
            // 종료 1단계가 명단을 비운 뒤에는 다시 채우지 않는다
            self.ensure_active()?;
            if members.contains_key(&user.id) {
                return Err(ChatError::AlreadyMember(user.id));
            }
            let user_id = user.id;
            members.insert(user_id, Member { user, connection });
            self.member_count.store(members.len(), Ordering::SeqCst);
            tracing::info!(room_id = %self.id, user_id = user_id, members = members.len(), "User joined room");
        }

        self.notify(SocketMessage::event(
            EventType::UserJoinRoom,
            format!("User: {} joined room", user_name),
        ));
        Ok(())
    }

    /// 방 나가기. 해제된 멤버(연결 핸들 포함)를 돌려준다
    pub async fn leave(&self, user_id: UserId) -> ChatResult<Member> {
        let member = {
            let mut members = self.members.lock().await;
            let member = members
                .remove(&user_id)
                .ok_or(ChatError::NotAMember(user_id))?;
            self.member_count.store(members.len(), Ordering::SeqCst);
            tracing::info!(room_id = %self.id, user_id = user_id, remaining = members.len(), "User left room");
            member
        };

        self.notify(SocketMessage::event(
            EventType::UserLeftRoom,
            format!("User: {} left room", member.user.user_name),
        ));
        Ok(member)
    }

    /// 큐에 메시지 추가. 큐가 가득 차면 여유가 생길 때까지 대기
    pub async fn broadcast(&self, message: SocketMessage) -> ChatResult<()> {
        self.ensure_active()?;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ChatError::RoomClosed(self.id)),
            sent = self.queue.send(message) => sent.map_err(|_| ChatError::RoomClosed(self.id)),
        }
    }

    /// 시스템 알림 추가. 레지스트리 락 아래에서 호출되므로 대기하지 않고,
    /// 큐가 가득 차면 새 알림을 버린다
    fn notify(&self, message: SocketMessage) {
        match self.queue.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                tracing::warn!(room_id = %self.id, event = message.event.as_str(), "Room queue full, dropped notification");
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(room_id = %self.id, "Room queue closed, notification skipped");
            }
        }
    }

    /// 설명 속성만 갱신 (멤버십/큐는 유지)
    pub async fn apply_record(&self, fresh: RoomRecord) {
        let mut record = self.record.write().await;
        record.name = fresh.name;
        record.owner_id = fresh.owner_id;
        record.room_type = fresh.room_type;
        record.updated_at = fresh.updated_at;
        record.is_deleted = fresh.is_deleted;
        if fresh.settings.is_some() {
            record.settings = fresh.settings;
        }
        tracing::debug!(room_id = %self.id, "Room record refreshed");
    }

    /// 종료 1단계: 신규 참여/브로드캐스트 차단, 소비자 취소, 명단 분리.
    /// 레지스트리 락 아래에서 호출되며, 이 호출로 전이가 일어났으면 분리된 멤버를 돌려준다
    pub async fn begin_shutdown(&self) -> Option<Vec<Member>> {
        // 동시 종료 호출이 분리가 끝나기 전에 명단을 가져가지 못하도록 전이 전에 잡는다
        let mut evicted = self.evicted.lock().await;
        let transitioned = self
            .state
            .compare_exchange(
                RoomState::Active as u8,
                RoomState::ShuttingDown as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if !transitioned {
            return None;
        }
        self.cancel.cancel();

        let detached: Vec<Member> = {
            let mut members = self.members.lock().await;
            self.member_count.store(0, Ordering::SeqCst);
            members.drain().map(|(_, member)| member).collect()
        };
        evicted.extend(detached.iter().cloned());

        tracing::info!(room_id = %self.id, detached = detached.len(), "Room shutting down");
        Some(detached)
    }

    /// 2단계 종료. 여러 번 호출해도 결과는 같다
    pub async fn shutdown(&self) {
        let mut consumer = self.consumer.lock().await;
        if self.state() == RoomState::Closed {
            return;
        }
        self.begin_shutdown().await;

        if let Some(handle) = consumer.take() {
            if let Err(e) = handle.await {
                tracing::warn!(room_id = %self.id, error = %e, "Room consumer ended abnormally");
            }
        }

        let evicted = std::mem::take(&mut *self.evicted.lock().await);
        let name = self.record.read().await.name.clone();
        let notice = SocketMessage::event(
            EventType::Notification,
            format!("Room {} has been closed", name),
        );

        let room_id = self.id;
        let notifications = evicted.into_iter().map(|member| {
            let notice = notice.clone();
            tokio::spawn(async move {
                if let Err(e) = member.connection.send(&notice) {
                    tracing::debug!(room_id = %room_id, user_id = member.user.id, error = %e, "Shutdown notice not delivered");
                }
                member.connection.close();
            })
        });
        let evicted_count = join_all(notifications)
            .await
            .into_iter()
            .filter(|result| match result {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(room_id = %room_id, error = %e, "Shutdown notice task failed");
                    false
                }
            })
            .count();

        self.state.store(RoomState::Closed as u8, Ordering::SeqCst);

        tracing::info!(room_id = %self.id, evicted = evicted_count, "Room closed");
    }
}

/// 소비자 루프: 취소되거나 큐가 닫힐 때까지 순서대로 팬아웃
async fn run_consumer(
    room_id: Uuid,
    mut receiver: mpsc::Receiver<SocketMessage>,
    members: Members,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = receiver.recv() => match next {
                Some(message) => fan_out(room_id, &members, &message).await,
                None => break,
            },
        }
    }
    tracing::debug!(room_id = %room_id, "Room consumer stopped");
}

/// 멤버 전원에게 전송. 실패한 멤버는 로그만 남기고 명단에 유지
async fn fan_out(room_id: Uuid, members: &Members, message: &SocketMessage) {
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(room_id = %room_id, error = %e, "Failed to encode room message");
            return;
        }
    };

    let members = members.lock().await;
    for (user_id, member) in members.iter() {
        if let Err(e) = member.connection.send_text(payload.clone()) {
            tracing::warn!(room_id = %room_id, user_id = *user_id, error = %e, "Failed to deliver room message");
        }
    }
}
