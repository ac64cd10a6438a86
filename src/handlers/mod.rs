//! 핸들러 모듈

pub mod connection;
pub mod identity;
pub mod message;
pub mod room;
pub mod socket;

pub use message::MessageRouter;
pub use socket::ws_handler;
