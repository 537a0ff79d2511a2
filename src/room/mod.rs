//! The chat room: broadcast hub, per-connection adapter, and tracing sink.
//!
//! A single [`RoomHub`] task owns room membership. Each connection runs a
//! read pump that forwards inbound payloads to the hub and a write pump
//! that drains the connection's bounded outbox. All coordination happens
//! over channels; nothing outside the hub touches the registry.

pub mod client;
pub mod client_id;
pub mod hub;
pub mod payload;
pub mod tracer;

pub use client::{read_pump, run_client, write_pump};
pub use client_id::ClientId;
pub use hub::{
    OverflowPolicy, Outbox, OutboxReceiver, Room, RoomConfig, RoomEvent, RoomHub, RoomStats,
};
pub use payload::Payload;
pub use tracer::{CapturingTracer, LogTracer, NoopTracer, TraceEvent, Tracer};
