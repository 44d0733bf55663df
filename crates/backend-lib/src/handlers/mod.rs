//! Request/response handlers for the room, history and login endpoints.

pub mod login;
pub mod rooms;
