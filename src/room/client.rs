//! Per-connection adapter: the read and write pumps.
//!
//! A connection is handed over as a [`Stream`] of inbound payloads and a
//! [`Sink`] for outbound ones, so the pumps do not care which transport
//! sits underneath. [`run_client`] wires one connection into a [`Room`].
//!
//! Both pumps of a connection share a [`CancellationToken`]. Whichever pump
//! finishes first cancels it and the other winds down.

use std::fmt;
use std::pin::pin;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::{ClientId, OutboxReceiver, Payload, Room};

/// Reads payloads from `inbound` and forwards each one to the room.
///
/// Stops on the first transport error, at end of stream, when the room
/// has shut down, or when `closer` is cancelled. Cancels `closer` on exit.
pub async fn read_pump<S, E>(inbound: S, room: &Room, id: ClientId, closer: &CancellationToken)
where
    S: Stream<Item = Result<Payload, E>>,
    E: fmt::Display,
{
    let mut inbound = pin!(inbound);

    loop {
        let next = tokio::select! {
            () = closer.cancelled() => break,
            next = inbound.next() => next,
        };

        match next {
            Some(Ok(payload)) => {
                if room.forward(payload).is_err() {
                    tracing::debug!(client = %id, "room closed, stopping reader");
                    break;
                }
            }
            Some(Err(err)) => {
                tracing::debug!(client = %id, error = %err, "read failed");
                break;
            }
            None => break,
        }
    }

    closer.cancel();
}

/// Drains `outbox` onto `outbound` in order.
///
/// Stops when the outbox is closed and empty, or on the first write
/// error. The sink is closed and `closer` cancelled on exit.
pub async fn write_pump<K>(
    mut outbox: OutboxReceiver,
    outbound: K,
    id: ClientId,
    closer: &CancellationToken,
) where
    K: Sink<Payload>,
    K::Error: fmt::Display,
{
    let mut outbound = pin!(outbound);

    while let Some(payload) = outbox.recv().await {
        if let Err(err) = outbound.send(payload).await {
            tracing::debug!(client = %id, error = %err, "write failed");
            break;
        }
    }

    if let Err(err) = outbound.close().await {
        tracing::debug!(client = %id, error = %err, "closing connection failed");
    }
    closer.cancel();
}

/// Submits `Leave` when dropped, so it happens on every exit path.
struct LeaveGuard<'a> {
    room: &'a Room,
    id: ClientId,
}

impl Drop for LeaveGuard<'_> {
    fn drop(&mut self) {
        // A closed room has already dropped every outbox.
        let _ = self.room.leave(self.id);
    }
}

/// Serves one connection until it ends.
///
/// Joins the room, spawns the write pump, runs the read pump in the
/// current task, then leaves the room and waits for the writer to flush.
pub async fn run_client<S, K, E>(inbound: S, outbound: K, room: Room)
where
    S: Stream<Item = Result<Payload, E>>,
    E: fmt::Display,
    K: Sink<Payload> + Send + 'static,
    K::Error: fmt::Display,
{
    let id = ClientId::new();
    let (outbox, outbox_rx) = room.open_outbox();

    if room.join(id, outbox).is_err() {
        tracing::warn!(client = %id, "room closed, rejecting connection");
        return;
    }
    tracing::info!(client = %id, "client connected");

    let closer = CancellationToken::new();
    let writer = {
        let closer = closer.clone();
        tokio::spawn(async move { write_pump(outbox_rx, outbound, id, &closer).await })
    };

    {
        let _leave = LeaveGuard { room: &room, id };
        read_pump(inbound, &room, id, &closer).await;
    }

    if let Err(err) = writer.await {
        tracing::warn!(client = %id, error = %err, "write pump panicked");
    }
    tracing::info!(client = %id, "client disconnected");
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{sink, stream};
    use tokio::sync::mpsc;

    use super::*;
    use crate::room::{CapturingTracer, NoopTracer, RoomConfig, Tracer};

    fn start() -> (Room, Arc<CapturingTracer>) {
        let tracer = Arc::new(CapturingTracer::new());
        let (room, hub) = Room::new(
            RoomConfig::default(),
            Arc::clone(&tracer) as Arc<dyn Tracer>,
        );
        tokio::spawn(hub.run());
        (room, tracer)
    }

    /// A test connection: push into `to_server`, read from `from_server`.
    struct Peer {
        to_server: mpsc::UnboundedSender<Result<Payload, String>>,
        from_server: mpsc::UnboundedReceiver<Payload>,
    }

    fn connect(room: &Room) -> (Peer, tokio::task::JoinHandle<()>) {
        let (to_server, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, from_server) = mpsc::unbounded_channel();

        let inbound = stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        let outbound = sink::unfold(outbound_tx, |tx, payload: Payload| async move {
            tx.send(payload).map_err(|_| "peer gone".to_string())?;
            Ok::<_, String>(tx)
        });

        let task = tokio::spawn(run_client(inbound, outbound, room.clone()));
        (
            Peer {
                to_server,
                from_server,
            },
            task,
        )
    }

    async fn recv_text(peer: &mut Peer) -> Option<String> {
        let next = tokio::time::timeout(Duration::from_secs(1), peer.from_server.recv()).await;
        next.ok()
            .flatten()
            .and_then(|p| p.as_text().map(str::to_string))
    }

    async fn wait_for_members(room: &Room, members: usize) {
        for _ in 0..100 {
            if matches!(room.stats().await, Ok(s) if s.members == members) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("room never reached {members} members");
    }

    #[tokio::test]
    async fn read_pump_exit_wakes_the_writer() {
        let (room, _) = start();
        let closer = CancellationToken::new();
        let writer_side = closer.clone();
        let mut cancelled = tokio_test::task::spawn(writer_side.cancelled());
        tokio_test::assert_pending!(cancelled.poll());

        let ended = stream::empty::<Result<Payload, Infallible>>();
        read_pump(ended, &room, ClientId::new(), &closer).await;

        assert!(cancelled.is_woken());
        tokio_test::assert_ready!(cancelled.poll());
    }

    #[tokio::test]
    async fn read_pump_forwards_until_error() {
        let (room, _) = start();
        let (outbox, mut rx) = room.open_outbox();
        let observer = ClientId::new();
        let Ok(()) = room.join(observer, outbox) else {
            panic!("join failed");
        };

        let inbound = stream::iter(vec![
            Ok(Payload::from("one")),
            Ok(Payload::from("two")),
            Err("connection reset"),
            Ok(Payload::from("never")),
        ]);
        let closer = CancellationToken::new();
        read_pump(inbound, &room, ClientId::new(), &closer).await;

        let Ok(stats) = room.stats().await else {
            panic!("hub stopped");
        };
        assert_eq!(stats.messages_received, 2);
        assert!(closer.is_cancelled());
        assert_eq!(rx.try_recv().ok(), Some(Payload::from("one")));
        assert_eq!(rx.try_recv().ok(), Some(Payload::from("two")));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn read_pump_stops_when_token_fires() {
        let (room, _) = start();
        let closer = CancellationToken::new();
        closer.cancel();
        let pending = stream::pending::<Result<Payload, Infallible>>();
        let finished = tokio::time::timeout(
            Duration::from_secs(1),
            read_pump(pending, &room, ClientId::new(), &closer),
        )
        .await;
        assert!(finished.is_ok());
    }

    #[tokio::test]
    async fn write_pump_preserves_order_and_drains_after_close() {
        let (tx, rx) = mpsc::channel(8);
        for text in ["a", "b", "c"] {
            let Ok(()) = tx.send(Payload::from(text)).await else {
                panic!("send failed");
            };
        }
        drop(tx);

        let (written_tx, mut written) = mpsc::unbounded_channel();
        let outbound = sink::unfold(written_tx, |tx, payload: Payload| async move {
            tx.send(payload).map_err(|_| "peer gone")?;
            Ok::<_, &str>(tx)
        });
        let closer = CancellationToken::new();
        write_pump(rx, outbound, ClientId::new(), &closer).await;

        for expected in ["a", "b", "c"] {
            assert_eq!(written.try_recv().ok(), Some(Payload::from(expected)));
        }
        assert!(written.try_recv().is_err());
        assert!(closer.is_cancelled());
    }

    #[tokio::test]
    async fn write_pump_stops_on_write_error() {
        let (tx, rx) = mpsc::channel(8);
        for text in ["a", "b"] {
            let Ok(()) = tx.send(Payload::from(text)).await else {
                panic!("send failed");
            };
        }

        let failing = sink::unfold((), |(), _payload: Payload| async {
            Err::<(), _>("broken pipe")
        });
        let closer = CancellationToken::new();
        let finished = tokio::time::timeout(
            Duration::from_secs(1),
            write_pump(rx, failing, ClientId::new(), &closer),
        )
        .await;

        // The outbox sender is still alive, so only the error ends the pump.
        assert!(finished.is_ok());
        assert!(closer.is_cancelled());
        drop(tx);
    }

    #[tokio::test]
    async fn two_clients_chat_through_the_room() {
        let (room, _) = start();
        let (mut a, a_task) = connect(&room);
        let (mut b, b_task) = connect(&room);
        wait_for_members(&room, 2).await;

        let Ok(()) = a.to_server.send(Ok(Payload::from("hello"))) else {
            panic!("send failed");
        };

        assert_eq!(recv_text(&mut b).await.as_deref(), Some("hello"));
        assert_eq!(recv_text(&mut a).await.as_deref(), Some("hello"));

        drop(a.to_server);
        drop(b.to_server);
        for task in [a_task, b_task] {
            let Ok(Ok(())) = tokio::time::timeout(Duration::from_secs(1), task).await else {
                panic!("client task did not finish");
            };
        }
        wait_for_members(&room, 0).await;
    }

    #[tokio::test]
    async fn read_error_leaves_room_exactly_once() {
        let (room, tracer) = start();
        let (a, a_task) = connect(&room);
        wait_for_members(&room, 1).await;

        let Ok(()) = a.to_server.send(Err("connection reset".to_string())) else {
            panic!("send failed");
        };
        let Ok(Ok(())) = tokio::time::timeout(Duration::from_secs(1), a_task).await else {
            panic!("client task did not finish");
        };

        wait_for_members(&room, 0).await;
        assert_eq!(tracer.count("client joined"), 1);
        assert_eq!(tracer.count("client left"), 1);
    }

    #[tokio::test]
    async fn write_failure_ends_the_reader_too() {
        let (room, _) = start();
        let (a, a_task) = connect(&room);
        let (b, b_task) = connect(&room);
        wait_for_members(&room, 2).await;

        // B's peer stops reading; the next write to it fails.
        drop(b.from_server);
        let Ok(()) = a.to_server.send(Ok(Payload::from("ping"))) else {
            panic!("send failed");
        };

        let Ok(Ok(())) = tokio::time::timeout(Duration::from_secs(1), b_task).await else {
            panic!("client B did not shut down after a write failure");
        };
        wait_for_members(&room, 1).await;

        drop(a.to_server);
        let Ok(Ok(())) = tokio::time::timeout(Duration::from_secs(1), a_task).await else {
            panic!("client A did not finish");
        };
        drop(b.to_server);
    }

    #[tokio::test]
    async fn client_is_rejected_when_room_is_closed() {
        let (room, hub) = Room::new(RoomConfig::default(), Arc::new(NoopTracer));
        drop(hub);

        let (peer, task) = connect(&room);
        let Ok(Ok(())) = tokio::time::timeout(Duration::from_secs(1), task).await else {
            panic!("client task did not finish");
        };
        drop(peer);
    }
}
