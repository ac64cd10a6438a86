//! 호출자 식별 (게이트웨이가 넣어주는 헤더 신뢰)

use crate::error::ChatError;
use crate::protocol::User;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";

#[async_trait]
impl<S> FromRequestParts<S> for User
where
    S: Send + Sync,
{
    type Rejection = ChatError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .ok_or(ChatError::Unauthenticated)?;

        let user_name = parts
            .headers
            .get(USER_NAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("user{id}"));

        Ok(User { id, user_name })
    }
}
