//! # chat-hub
//!
//! Single-room broadcast hub for real-time text chat over WebSockets.
//!
//! Every message a participant sends is forwarded to every participant
//! currently in the room, the sender included. There is no history,
//! authentication, or multi-room routing.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket)
//!     │
//!     ├── WS Handler (ws/)          GET /room upgrade
//!     │
//!     ├── run_client (room/client)  read pump ─┐   ┌─ write pump
//!     │                                        ▼   │
//!     ├── RoomHub (room/hub)        registry, fan-out into outboxes
//!     │
//!     └── System endpoints (api/)   /health, /room/stats
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod error;
pub mod room;
pub mod server;
pub mod ws;
