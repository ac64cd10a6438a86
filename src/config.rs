//! 환경 변수 기반 설정 관리

use std::env;

/// 서버 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub host: String,
    pub cors_origins: Vec<String>,
    pub room: RoomConfig,
    pub persistence: PersistenceConfig,
    pub log_level: String,
}

/// 방 설정
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// 방 브로드캐스트 큐 용량
    pub queue_capacity: usize,
}

/// 영속화 서비스 설정
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// 미설정 시 인메모리 저장소 사용
    pub url: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            cors_origins: vec!["*".to_string()],
            room: RoomConfig {
                queue_capacity: 256,
            },
            persistence: PersistenceConfig {
                url: None,
                request_timeout_secs: 10,
            },
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            host: env::var("HOST").unwrap_or(defaults.host),
            cors_origins: env::var("CORS_ORIGINS")
                .map(|v| parse_list(&v))
                .unwrap_or(defaults.cors_origins),
            room: RoomConfig {
                queue_capacity: env::var("ROOM_QUEUE_CAPACITY")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|capacity: &usize| *capacity > 0)
                    .unwrap_or(defaults.room.queue_capacity),
            },
            persistence: PersistenceConfig {
                url: env::var("PERSISTENCE_URL")
                    .ok()
                    .map(|v| v.trim().trim_end_matches('/').to_string())
                    .filter(|v| !v.is_empty()),
                request_timeout_secs: env::var("REQUEST_TIMEOUT_SECONDS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.persistence.request_timeout_secs),
            },
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        }
    }

    /// CORS 전체 허용 여부
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
