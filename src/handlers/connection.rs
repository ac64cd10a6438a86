//! 연결 핸들러

use crate::protocol::{EventType, SocketMessage, User};
use crate::session::{Connection, Frame};
use crate::state::AppState;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// 새 연결 처리. 같은 사용자의 이전 연결은 닫고 방에서도 내보낸다
pub async fn handle_connection(
    state: Arc<AppState>,
    user: &User,
) -> (Connection, UnboundedReceiver<Frame>) {
    let (connection, receiver) = Connection::open(user.id);

    if let Some(prior) = state.connections.register(connection.clone()) {
        prior.close();
        match state.presence.release_connection(user.id, prior.id()).await {
            Ok(true) => tracing::info!(user_id = user.id, "Replaced connection left its room"),
            Ok(false) => {}
            Err(e) => tracing::warn!(user_id = user.id, error = %e, "Replaced connection cleanup failed"),
        }
    }

    let greeting = SocketMessage::event(
        EventType::Greeting,
        format!("Welcome back {}", user.user_name),
    );
    if let Err(e) = connection.send(&greeting) {
        tracing::debug!(user_id = user.id, error = %e, "Greeting not sent");
    }

    tracing::info!(user_id = user.id, connection_id = %connection.id(), "New connection established");
    (connection, receiver)
}

/// 연결 해제 처리
pub async fn handle_disconnect(state: Arc<AppState>, connection: &Connection) {
    let user_id = connection.user_id();
    state
        .connections
        .remove_if_current(user_id, connection.id());

    if let Err(e) = state
        .presence
        .release_connection(user_id, connection.id())
        .await
    {
        tracing::warn!(user_id = user_id, error = %e, "Presence cleanup failed");
    }

    connection.close();
    tracing::info!(user_id = user_id, connection_id = %connection.id(), "Connection closed");
}

/// 전체 연결에 알림 전송
pub fn send_notification(state: &AppState, content: &str) -> usize {
    let delivered = state.connections.broadcast_all(content);
    tracing::info!(
        delivered = delivered,
        connections = state.connections.len(),
        "Notification sent"
    );
    delivered
}
