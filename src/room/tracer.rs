//! Observability sink for room activity.
//!
//! The hub reports every membership change and delivery step through a
//! [`Tracer`] handed to it at construction. [`NoopTracer`] is the default;
//! [`LogTracer`] forwards to `tracing`; [`CapturingTracer`] records events
//! so tests can assert on them.

use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Receives human-readable trace events from the hub.
///
/// Called from inside the hub loop on every event, so implementations must
/// be cheap and must not block.
pub trait Tracer: Send + Sync + fmt::Debug {
    /// Records one event with an optional detail string.
    fn trace(&self, event: &str, detail: Option<&str>);

    /// Whether events are recorded at all. The hub skips building detail
    /// strings when this is `false`.
    fn enabled(&self) -> bool {
        true
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn trace(&self, _event: &str, _detail: Option<&str>) {}

    fn enabled(&self) -> bool {
        false
    }
}

/// Forwards events to the `tracing` facade at `DEBUG` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn trace(&self, event: &str, detail: Option<&str>) {
        match detail {
            Some(detail) => tracing::debug!(target: "chat_hub::room", %detail, "{event}"),
            None => tracing::debug!(target: "chat_hub::room", "{event}"),
        }
    }

    fn enabled(&self) -> bool {
        tracing::enabled!(target: "chat_hub::room", tracing::Level::DEBUG)
    }
}

/// A single recorded trace event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    /// Event name, e.g. `"client joined"`.
    pub event: String,
    /// Optional detail (payload text, client id).
    pub detail: Option<String>,
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CapturingTracer {
    events: Mutex<Vec<TraceEvent>>,
}

impl CapturingTracer {
    /// Creates an empty capturing tracer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns only the event names, in order.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.event).collect()
    }

    /// Counts the events with the given name.
    #[must_use]
    pub fn count(&self, event: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.event == event)
            .count()
    }
}

impl Tracer for CapturingTracer {
    fn trace(&self, event: &str, detail: Option<&str>) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(TraceEvent {
                event: event.to_string(),
                detail: detail.map(str::to_string),
            });
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn capturing_tracer_records_in_order() {
        let tracer = CapturingTracer::new();
        tracer.trace("client joined", None);
        tracer.trace("message received", Some("hi"));

        let events = tracer.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events.first().map(|e| e.event.as_str()), Some("client joined"));
        assert_eq!(
            events.get(1).and_then(|e| e.detail.as_deref()),
            Some("hi")
        );
        assert_eq!(tracer.count("client joined"), 1);
    }

    #[test]
    fn noop_tracer_is_disabled() {
        assert!(!NoopTracer.enabled());
        assert!(CapturingTracer::new().enabled());
    }

    /// In-memory writer for a test subscriber.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn log_tracer_emits_debug_events() {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            assert!(LogTracer.enabled());
            LogTracer.trace("message received", Some("hello room"));
            LogTracer.trace("room stopped", None);
        });

        let bytes = buf.0.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let output = String::from_utf8_lossy(&bytes).into_owned();
        assert!(output.contains("message received"), "{output}");
        assert!(output.contains("detail=hello room"), "{output}");
        assert!(output.contains("room stopped"), "{output}");
        assert!(output.contains("chat_hub::room"), "{output}");
    }

    #[test]
    fn log_tracer_is_disabled_above_debug() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            assert!(!LogTracer.enabled());
        });
    }
}
