//! 라우터 설정

use crate::config::Config;
use crate::handlers::{room, ws_handler};
use crate::state::AppState;
use axum::{
    http::HeaderValue,
    response::{Html, Json},
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

pub fn router(state: Arc<AppState>, config: &Config) -> Router {
    let api = Router::new()
        .route("/all_rooms", get(room::list_rooms))
        .route("/chat_room", post(room::create_room))
        .route("/chat_room/:room_id", delete(room::delete_room))
        .route("/chat_room_settings/:room_id", get(room::room_settings))
        .route("/user_join_room", post(room::join_room))
        .route("/user_leave_room", get(room::leave_room))
        .route("/user_switch_room", post(room::switch_room))
        .route("/user_location", get(room::user_location))
        .route("/message/:room_id", get(room::chat_messages))
        .route("/send_chat_message", post(room::send_chat_message));

    let ws_api = Router::new()
        .route("/ws", get(ws_handler))
        .route("/send_notification", post(room::send_notification));

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .nest("/api", api)
        .nest("/ws-api", ws_api)
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origin = if config.allows_any_origin() {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn index_handler() -> Html<&'static str> {
    Html("<h1>Chatroom Socket Server</h1><p>WebSocket endpoint: /ws-api/ws</p>")
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "server": "chatroom-socket-rs",
        "timestamp": Utc::now().timestamp()
    }))
}
