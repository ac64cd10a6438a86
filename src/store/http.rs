//! 원격 영속화 서비스 클라이언트
//!
//! 모든 응답은 `{ "message": <T>, "status": <int> }` 형태로 감싸져 온다.

use super::{ChatStore, StoreError};
use crate::protocol::{ChatMessage, RoomDraft, RoomRecord, RoomSettings};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct ServiceResponse<T> {
    message: T,
    #[allow(dead_code)]
    #[serde(default)]
    status: u16,
}

pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStore {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// 상태 코드 확인 후 응답 본문 해제
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StoreError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), body = %body, "Persistence service rejected request");
        return Err(StoreError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let envelope: ServiceResponse<T> = response.json().await?;
    Ok(envelope.message)
}

#[async_trait]
impl ChatStore for HttpStore {
    async fn list_rooms(&self) -> Result<Vec<RoomRecord>, StoreError> {
        let response = self.client.get(self.url("/chat_rooms")).send().await?;
        decode(response).await
    }

    async fn create_room(&self, draft: &RoomDraft) -> Result<RoomRecord, StoreError> {
        let response = self
            .client
            .post(self.url("/chat_room"))
            .json(draft)
            .send()
            .await?;
        decode(response).await
    }

    async fn soft_delete_room(&self, room_id: Uuid) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.url(&format!("/chat_room/{room_id}")))
            .send()
            .await?;
        decode::<serde_json::Value>(response).await.map(|_| ())
    }

    async fn get_room_settings(&self, room_id: Uuid) -> Result<RoomSettings, StoreError> {
        let response = self
            .client
            .get(self.url(&format!("/chat_room_settings/{room_id}")))
            .send()
            .await?;
        decode(response).await
    }

    async fn get_room(&self, room_id: Uuid) -> Result<RoomRecord, StoreError> {
        let response = self
            .client
            .get(self.url(&format!("/chat_room/{room_id}")))
            .send()
            .await?;
        decode(response).await
    }

    async fn save_message(&self, message: &ChatMessage) -> Result<ChatMessage, StoreError> {
        let response = self
            .client
            .post(self.url("/send_chat_message"))
            .json(message)
            .send()
            .await?;
        decode(response).await
    }

    async fn list_messages(
        &self,
        room_id: Uuid,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let response = self
            .client
            .get(self.url(&format!("/chat_messages/{room_id}")))
            .query(&[("offset", offset), ("limit", limit)])
            .send()
            .await?;
        let mut messages: Vec<ChatMessage> = decode(response).await?;
        for message in &mut messages {
            message.is_committed = true;
        }
        Ok(messages)
    }
}
