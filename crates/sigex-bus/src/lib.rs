//! The EventBus: a synchronous multi-subscriber pub/sub carrying
//! signal events, milestones, progress, and the three error taxonomy buses
//! (recoverable, fatal, validation).
//!
//! A single `broadcast::Sender` carrying a tagged enum, with
//! `BroadcastStream` turning a receiver into a
//! `Stream` for consumers that want one (the orchestrators' own progress
//! reporting, or an SSE-style surface a host might bolt on later). On top of
//! that we add `subscribe_callback`, which spawns a task draining its own
//! receiver and awaiting the callback once per message — since a broadcast
//! receiver preserves send order, this gives each individual subscriber the
//! FIFO, never-preempted-by-the-next-message guarantee each subscriber needs
//! without serializing unrelated subscribers against each other.

mod cancel;
mod event;

pub use cancel::CancelToken;
pub use event::{BusEvent, Scope};

use futures_util::StreamExt;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

/// Default channel depth. Sized generously: a backtest run emits a
/// `backtest_timeframe` performance event per tick, and a slow subscriber
/// should not stall the producer — lagged subscribers simply miss the
/// oldest buffered events (`BroadcastStream` surfaces this as a `Lagged`
/// item, which callback subscribers skip over).
const DEFAULT_CAPACITY: usize = 4096;

/// Handle shared by every producer (SignalMachine, orchestrators, RiskGate)
/// and consumer (callback subscribers, stream subscribers) in a process.
/// Cheap to clone — it is a thin wrapper around a `broadcast::Sender`.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_CAPACITY);
        EventBus { tx }
    }

    /// Publish one event. Never blocks; a `send` with no receivers (or only
    /// lagging ones) is not an error — event emission is non-suspending
    /// from the producer's view.
    pub fn publish(&self, event: BusEvent) {
        let _ = self.tx.send(event);
    }

    /// Raw stream of every event on the bus, for a consumer that wants to
    /// filter client-side (e.g. an SSE route).
    pub fn stream(&self) -> impl futures_util::Stream<Item = BusEvent> + Send + 'static {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|r| async move { r.ok() })
    }

    /// Register a callback that runs once per matching event, strictly in
    /// the order the bus saw them, never concurrently with itself. Returns
    /// a `JoinHandle`-less fire-and-forget subscription: drop the returned
    /// guard to stop listening.
    pub fn subscribe_callback<F>(&self, mut callback: F) -> SubscriptionGuard
    where
        F: FnMut(BusEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "bus subscriber lagged, dropping oldest events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        SubscriptionGuard { handle }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Dropping this aborts the subscriber's background task.
pub struct SubscriptionGuard {
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event::BusEvent::Performance;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn callback_subscriber_sees_events_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let _guard = bus.subscribe_callback(move |event| {
            let seen = seen2.clone();
            Box::pin(async move {
                if let Performance { metric, .. } = event {
                    seen.lock().unwrap().push(metric);
                }
            })
        });

        for i in 0..5 {
            bus.publish(Performance {
                metric: format!("m{i}"),
                value: i as f64,
            });
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let got = seen.lock().unwrap().clone();
        assert_eq!(got, vec!["m0", "m1", "m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn publish_with_zero_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(Performance {
            metric: "noop".into(),
            value: 0.0,
        });
    }

    #[tokio::test]
    async fn stream_yields_published_events() {
        let bus = EventBus::new();
        let mut stream = Box::pin(bus.stream());
        bus.publish(Performance {
            metric: "x".into(),
            value: 1.0,
        });
        let got = stream.next().await;
        assert!(matches!(got, Some(Performance { .. })));
    }

    #[tokio::test]
    async fn dropping_guard_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let guard = bus.subscribe_callback(move |_| {
            let count = count2.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
            })
        });
        drop(guard);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        bus.publish(Performance {
            metric: "after-drop".into(),
            value: 0.0,
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
