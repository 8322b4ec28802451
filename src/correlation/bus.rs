use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::debug;

use super::signal::{SignalKind, SignalPayload};

type ChannelId = (SignalKind, String);
type Channels = HashMap<ChannelId, Vec<oneshot::Sender<SignalPayload>>>;

/// Registry of one-shot waiters keyed by `(kind, correlation key)`.
///
/// Cloning is cheap; clones share the same registry, so the gateway and the
/// completion hook each hold a handle to one bus.
///
/// ## Example
///
/// ```
/// use awaitable_emit::correlation::{CorrelationBus, SignalKind};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let bus = CorrelationBus::new();
/// let waiter = bus.subscribe_once("42", SignalKind::Success);
///
/// assert_eq!(bus.publish("42", SignalKind::Success, None), 1);
/// assert!(waiter.await.is_some());
/// # }
/// ```
#[derive(Clone, Default)]
pub struct CorrelationBus {
    channels: Arc<Mutex<Channels>>,
}

impl CorrelationBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the next `kind` signal for `key`.
    ///
    /// The subscription is registered immediately, not on first poll.
    /// Dropping it unregisters the waiter.
    pub fn subscribe_once(&self, key: &str, kind: SignalKind) -> Subscription {
        let id = (kind, key.to_string());
        let (tx, rx) = oneshot::channel();

        let mut channels = self.lock();
        let waiters = channels.entry(id.clone()).or_default();
        waiters.retain(|waiter| !waiter.is_closed());
        waiters.push(tx);

        Subscription {
            id,
            rx,
            channels: Arc::downgrade(&self.channels),
        }
    }

    /// Notify every current subscriber of `(key, kind)` and clear them.
    ///
    /// Returns the number of subscribers that received the signal. A signal
    /// published with no subscribers is lost.
    pub fn publish(&self, key: &str, kind: SignalKind, payload: SignalPayload) -> usize {
        let waiters = self
            .lock()
            .remove(&(kind, key.to_string()))
            .unwrap_or_default();

        let delivered = waiters
            .into_iter()
            .map(|waiter| waiter.send(payload.clone()).is_ok())
            .filter(|sent| *sent)
            .count();

        if delivered == 0 {
            debug!(channel = %kind.channel_name(key), "signal published with no subscribers");
        }
        delivered
    }

    /// Number of live subscribers waiting on `(key, kind)`.
    pub fn subscriber_count(&self, key: &str, kind: SignalKind) -> usize {
        self.lock()
            .get(&(kind, key.to_string()))
            .map(|waiters| waiters.iter().filter(|w| !w.is_closed()).count())
            .unwrap_or(0)
    }

    /// Number of channels that currently have at least one registered waiter.
    pub fn channel_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Channels> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A pending one-shot wait on a correlation channel.
///
/// Resolves to `Some(payload)` when the signal is published, or `None` if
/// every handle to the bus was dropped first.
pub struct Subscription {
    id: ChannelId,
    rx: oneshot::Receiver<SignalPayload>,
    channels: Weak<Mutex<Channels>>,
}

impl Subscription {
    /// The kind of signal this subscription waits for.
    pub fn kind(&self) -> SignalKind {
        self.id.0
    }

    /// The correlation key this subscription waits on.
    pub fn key(&self) -> &str {
        &self.id.1
    }
}

impl Future for Subscription {
    type Output = Option<SignalPayload>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.rx.close();

        let Some(channels) = self.channels.upgrade() else {
            return;
        };
        let mut channels = channels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(waiters) = channels.get_mut(&self.id) {
            waiters.retain(|waiter| !waiter.is_closed());
            if waiters.is_empty() {
                channels.remove(&self.id);
            }
        }
    }
}
