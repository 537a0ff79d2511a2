//! Bridges an axum [`WebSocket`] to the room's transport-agnostic pumps.
//!
//! Inbound text and binary frames become [`Payload`]s; ping/pong frames are
//! answered by the transport and skipped; a close frame ends the read side.
//! Outbound payloads go out as text frames when they are valid UTF-8 and as
//! binary frames otherwise.

use std::future;

use axum::body::Bytes;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::{SinkExt, StreamExt};

use crate::room::{Payload, Room, run_client};

/// Runs one WebSocket connection as a member of `room` until it closes.
pub async fn run_connection(socket: WebSocket, room: Room) {
    let (ws_tx, ws_rx) = socket.split();

    let inbound = ws_rx
        .take_while(|frame| future::ready(!matches!(frame, Ok(Message::Close(_)))))
        .filter_map(|frame| future::ready(frame_to_payload(frame)));
    let outbound = ws_tx.with(|payload: Payload| {
        future::ready(Ok::<_, axum::Error>(payload_to_frame(payload)))
    });

    run_client(inbound, outbound, room).await;
    tracing::debug!("ws connection closed");
}

/// Maps an inbound frame to a payload; control frames yield `None`.
fn frame_to_payload(
    frame: Result<Message, axum::Error>,
) -> Option<Result<Payload, axum::Error>> {
    match frame {
        Ok(Message::Text(text)) => Some(Ok(Payload::from(Bytes::from(text)))),
        Ok(Message::Binary(bytes)) => Some(Ok(Payload::from(bytes))),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Close(_)) => None,
        Err(err) => Some(Err(err)),
    }
}

/// Both directions reuse the payload's buffer; nothing is copied.
fn payload_to_frame(payload: Payload) -> Message {
    let bytes = payload.into_bytes();
    // The clone only bumps a reference count; the error path needs the bytes back.
    match Utf8Bytes::try_from(bytes.clone()) {
        Ok(text) => Message::Text(text),
        Err(_) => Message::Binary(bytes),
    }
}
