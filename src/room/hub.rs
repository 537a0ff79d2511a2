//! The broadcast hub: room membership and message fan-out.
//!
//! [`RoomHub`] owns the registry of joined clients and is the only code
//! that reads or writes it. Everything else talks to it through a cloneable
//! [`Room`] handle that submits [`RoomEvent`]s over one unbounded FIFO
//! channel, so membership changes and fan-out are serialized without locks.
//!
//! # Ordering
//!
//! Every event goes through the same queue. A client's `Join` is therefore
//! processed before any `Forward` or `Leave` that same client submits after
//! it, and a `Forward` is delivered to every member registered at that
//! moment before the next event is looked at.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use utoipa::ToSchema;

use super::{ClientId, Payload, Tracer};
use crate::config::DEFAULT_OUTBOX_CAPACITY;
use crate::error::HubError;

/// Sending half of a client's bounded outbox. Held only by the hub.
pub type Outbox = mpsc::Sender<Payload>;

/// Receiving half of a client's outbox, drained by its write pump.
pub type OutboxReceiver = mpsc::Receiver<Payload>;

/// What the hub does when a member's outbox is full during fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for space. A stalled reader stalls the whole room.
    Block,
    /// Skip this payload for the full member only.
    Drop,
    /// Remove the full member from the room, closing its outbox.
    #[default]
    Disconnect,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Block => "block",
            Self::Drop => "drop",
            Self::Disconnect => "disconnect",
        };
        f.write_str(name)
    }
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(Self::Block),
            "drop" => Ok(Self::Drop),
            "disconnect" => Ok(Self::Disconnect),
            other => Err(format!("unknown overflow policy: {other}")),
        }
    }
}

/// Hub settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomConfig {
    /// Bound of each client's outbox.
    pub outbox_capacity: usize,
    /// Behaviour when an outbox is full.
    pub overflow: OverflowPolicy,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            overflow: OverflowPolicy::default(),
        }
    }
}

/// Point-in-time counters reported by the hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RoomStats {
    /// Clients currently registered.
    pub members: usize,
    /// `Forward` events processed.
    pub messages_received: u64,
    /// Payloads enqueued into member outboxes.
    pub deliveries: u64,
    /// Payloads skipped because an outbox was full (`drop` policy).
    pub dropped: u64,
    /// Members removed by the hub itself (full or closed outbox).
    pub evicted: u64,
}

/// An event submitted to the hub.
#[derive(Debug)]
pub enum RoomEvent {
    /// Register a client together with its outbox.
    Join {
        /// The joining client.
        id: ClientId,
        /// Where the hub enqueues payloads for this client.
        outbox: Outbox,
    },
    /// Unregister a client and close its outbox.
    Leave(ClientId),
    /// Fan a payload out to every registered client.
    Forward(Payload),
    /// Report current counters.
    Stats(oneshot::Sender<RoomStats>),
}

/// Cloneable handle used to submit events to a [`RoomHub`].
#[derive(Debug, Clone)]
pub struct Room {
    events: mpsc::UnboundedSender<RoomEvent>,
    outbox_capacity: usize,
}

impl Room {
    /// Creates a room handle and the hub that serves it.
    ///
    /// The hub does nothing until [`RoomHub::run`] or
    /// [`RoomHub::run_until`] is polled; events submitted before that are
    /// queued.
    #[must_use]
    pub fn new(config: RoomConfig, tracer: Arc<dyn Tracer>) -> (Self, RoomHub) {
        let (tx, rx) = mpsc::unbounded_channel();
        let room = Self {
            events: tx,
            outbox_capacity: config.outbox_capacity.max(1),
        };
        let hub = RoomHub {
            events: rx,
            members: HashMap::new(),
            overflow: config.overflow,
            tracer,
            stats: RoomStats::default(),
        };
        (room, hub)
    }

    /// Creates a bounded outbox sized to this room's configuration.
    #[must_use]
    pub fn open_outbox(&self) -> (Outbox, OutboxReceiver) {
        mpsc::channel(self.outbox_capacity)
    }

    /// Submits a `Join` for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::RoomClosed`] if the hub has stopped.
    pub fn join(&self, id: ClientId, outbox: Outbox) -> Result<(), HubError> {
        self.submit(RoomEvent::Join { id, outbox })
    }

    /// Submits a `Leave` for `id`. Leaving twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::RoomClosed`] if the hub has stopped.
    pub fn leave(&self, id: ClientId) -> Result<(), HubError> {
        self.submit(RoomEvent::Leave(id))
    }

    /// Submits a payload for fan-out.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::RoomClosed`] if the hub has stopped.
    pub fn forward(&self, payload: Payload) -> Result<(), HubError> {
        self.submit(RoomEvent::Forward(payload))
    }

    /// Asks the hub for its counters.
    ///
    /// The reply is produced after every event submitted earlier through
    /// any handle has been processed.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::RoomClosed`] if the hub has stopped or stops
    /// before answering.
    pub async fn stats(&self) -> Result<RoomStats, HubError> {
        let (tx, rx) = oneshot::channel();
        self.submit(RoomEvent::Stats(tx))?;
        rx.await.map_err(|_| HubError::RoomClosed)
    }

    /// Returns `true` once the hub loop has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    fn submit(&self, event: RoomEvent) -> Result<(), HubError> {
        self.events.send(event).map_err(|_| HubError::RoomClosed)
    }
}

/// The hub's event loop state. Owns the registry exclusively.
#[derive(Debug)]
pub struct RoomHub {
    events: mpsc::UnboundedReceiver<RoomEvent>,
    members: HashMap<ClientId, Outbox>,
    overflow: OverflowPolicy,
    tracer: Arc<dyn Tracer>,
    stats: RoomStats,
}

impl RoomHub {
    /// Processes events until every [`Room`] handle has been dropped.
    pub async fn run(self) {
        self.run_until(std::future::pending()).await;
    }

    /// Processes events until `shutdown` completes or every [`Room`]
    /// handle has been dropped.
    ///
    /// Shutdown is only observed between events: a fan-out in progress
    /// always finishes. On exit every member's outbox is closed.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => break,
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
            }
        }

        self.stop();
    }

    async fn handle(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Join { id, outbox } => self.join(id, outbox),
            RoomEvent::Leave(id) => self.leave(id),
            RoomEvent::Forward(payload) => self.fan_out(payload).await,
            RoomEvent::Stats(reply) => {
                // The requester may have given up waiting.
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn join(&mut self, id: ClientId, outbox: Outbox) {
        // Re-joining replaces (and thereby closes) the previous outbox.
        self.members.insert(id, outbox);
        self.trace_client("client joined", id);
        tracing::debug!(client = %id, members = self.members.len(), "client joined room");
    }

    fn leave(&mut self, id: ClientId) {
        // Dropping the sender closes the outbox; the write pump drains and exits.
        if self.members.remove(&id).is_some() {
            self.trace_client("client left", id);
            tracing::debug!(client = %id, members = self.members.len(), "client left room");
        }
    }

    async fn fan_out(&mut self, payload: Payload) {
        self.stats.messages_received += 1;
        if self.tracer.enabled() {
            match payload.as_text() {
                Some(text) => self.tracer.trace("message received", Some(text)),
                None => {
                    let summary = format!("<{} bytes of binary data>", payload.len());
                    self.tracer.trace("message received", Some(&summary));
                }
            }
        }

        let mut evicted = Vec::new();

        for (id, outbox) in &self.members {
            let delivered = match self.overflow {
                OverflowPolicy::Block => outbox.send(payload.clone()).await.is_ok(),
                OverflowPolicy::Drop | OverflowPolicy::Disconnect => {
                    match outbox.try_send(payload.clone()) {
                        Ok(()) => true,
                        Err(TrySendError::Full(_)) if self.overflow == OverflowPolicy::Drop => {
                            self.stats.dropped += 1;
                            self.trace_client("message dropped", *id);
                            tracing::warn!(client = %id, "outbox full, payload dropped");
                            continue;
                        }
                        Err(TrySendError::Full(_)) => {
                            tracing::warn!(client = %id, "outbox full, disconnecting client");
                            false
                        }
                        Err(TrySendError::Closed(_)) => false,
                    }
                }
            };

            if delivered {
                self.stats.deliveries += 1;
                self.trace_client("sent to client", *id);
            } else {
                evicted.push(*id);
            }
        }

        for id in evicted {
            if self.members.remove(&id).is_some() {
                self.stats.evicted += 1;
                self.trace_client("client evicted", id);
            }
        }
    }

    fn trace_client(&self, event: &str, id: ClientId) {
        if self.tracer.enabled() {
            self.tracer.trace(event, Some(&id.to_string()));
        }
    }

    fn snapshot(&self) -> RoomStats {
        RoomStats {
            members: self.members.len(),
            ..self.stats
        }
    }

    fn stop(&mut self) {
        let members = self.members.len();
        self.members.clear();
        self.tracer.trace("room stopped", None);
        tracing::info!(members, "room hub stopped");
    }
}
