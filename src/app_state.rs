//! Shared application state injected into all Axum handlers.

use crate::config::ChatConfig;
use crate::room::Room;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Handle to the room hub.
    pub room: Room,
    /// Server configuration (socket limits for upgrades).
    pub config: ChatConfig,
}
