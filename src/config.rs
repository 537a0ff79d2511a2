//! Server configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;

use crate::room::{OverflowPolicy, RoomConfig};

/// Default number of payloads buffered per connection.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Default WebSocket read/write buffer size in bytes.
pub const DEFAULT_SOCKET_BUFFER_SIZE: usize = 1024;

/// Default upper bound for a single inbound message, in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Top-level server configuration.
///
/// Loaded once at startup via [`ChatConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:8080`).
    pub listen_addr: SocketAddr,

    /// Maximum buffered outbound payloads per connection.
    pub outbox_capacity: usize,

    /// What the hub does when a member's outbox is full.
    pub overflow: OverflowPolicy,

    /// WebSocket read and write buffer size in bytes.
    pub socket_buffer_size: usize,

    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,

    /// Whether room trace events are forwarded to the log.
    pub trace_enabled: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            overflow: OverflowPolicy::default(),
            socket_buffer_size: DEFAULT_SOCKET_BUFFER_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            trace_enabled: false,
        }
    }
}

impl ChatConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set or invalid.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, std::net::AddrParseError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let listen_addr = match std::env::var("LISTEN_ADDR") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.listen_addr,
        };

        // A zero-capacity outbox cannot be created.
        let outbox_capacity =
            parse_env("OUTBOX_CAPACITY", defaults.outbox_capacity).max(1);
        let overflow = parse_env("OUTBOX_OVERFLOW", defaults.overflow);
        let socket_buffer_size = parse_env("SOCKET_BUFFER_SIZE", defaults.socket_buffer_size);
        let max_message_size = parse_env("MAX_MESSAGE_SIZE", defaults.max_message_size);
        let trace_enabled = parse_env_bool("TRACE_ENABLED", defaults.trace_enabled);

        Ok(Self {
            listen_addr,
            outbox_capacity,
            overflow,
            socket_buffer_size,
            max_message_size,
            trace_enabled,
        })
    }

    /// The subset of settings consumed by the room hub.
    #[must_use]
    pub const fn room_config(&self) -> RoomConfig {
        RoomConfig {
            outbox_capacity: self.outbox_capacity,
            overflow: self.overflow,
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().map(|v| v.to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ChatConfig::default();
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.outbox_capacity, 256);
        assert_eq!(config.overflow, OverflowPolicy::Disconnect);
        assert!(!config.trace_enabled);
    }

    #[test]
    fn room_config_carries_outbox_settings() {
        let config = ChatConfig {
            outbox_capacity: 4,
            overflow: OverflowPolicy::Drop,
            ..ChatConfig::default()
        };
        let room = config.room_config();
        assert_eq!(room.outbox_capacity, 4);
        assert_eq!(room.overflow, OverflowPolicy::Drop);
    }

    #[test]
    fn missing_variable_falls_back_to_default() {
        assert_eq!(parse_env("CHAT_HUB_TEST_UNSET_VARIABLE", 7_usize), 7);
        assert!(parse_env_bool("CHAT_HUB_TEST_UNSET_VARIABLE", true));
    }
}
