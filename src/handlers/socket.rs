//! WebSocket 업그레이드 및 수신 루프

use super::connection::{handle_connection, handle_disconnect};
use crate::protocol::User;
use crate::session::Frame;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;

/// 종료 후 송신 태스크가 남은 프레임을 비울 시간
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    user: User,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user: User) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // 연결 처리
    let (connection, mut rx) = handle_connection(state.clone(), &user).await;

    // 송신 태스크
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                Frame::Text(text) => {
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Frame::Close => {
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // 수신 처리. 서버 측 종료(방 삭제, 재접속)도 루프를 끝낸다
    loop {
        tokio::select! {
            _ = connection.closed() => break,
            incoming = ws_receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = state.router.receive_text(&user, &text).await {
                        tracing::debug!(user_id = user.id, error = %e, "Rejected socket message");
                        let _ = connection.send_text(e.to_string());
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(user_id = user.id, error = %e, "Socket read failed");
                    break;
                }
                Some(Ok(_)) => {}
            }
        }
    }

    // 연결 해제
    handle_disconnect(state, &connection).await;
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut send_task)
        .await
        .is_err()
    {
        send_task.abort();
    }
}
