// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for Prometheus metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_DISCONNECTION: &str = "ws.disconnection";
pub const WS_ACTIVE: &str = "ws.active";
pub const MESSAGE_RECEIVED: &str = "message.received";
pub const MESSAGE_MALFORMED: &str = "message.malformed";
pub const BROADCAST_DELIVERED: &str = "broadcast.delivered";
pub const BROADCAST_DROPPED: &str = "broadcast.dropped";
pub const BROADCAST_FANOUT: &str = "broadcast.fanout";
pub const PERSIST_FAILED: &str = "persist.failed";
pub const ROOM_CREATED: &str = "room.created";
pub const ROOM_DELETED: &str = "room.deleted";
