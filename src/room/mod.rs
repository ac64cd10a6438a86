//! 방 모듈: 브로드캐스트 액터, 방 레지스트리, 프레즌스 추적

pub mod actor;
pub mod presence;
pub mod registry;

pub use actor::{Member, Room, RoomState};
pub use presence::PresenceTracker;
pub use registry::RoomRegistry;
