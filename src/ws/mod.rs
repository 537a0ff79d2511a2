//! WebSocket layer: the room's entry point.
//!
//! The endpoint at `/room` upgrades each request to a WebSocket and hands
//! the connection to the room as a new member.

pub mod connection;
pub mod handler;
