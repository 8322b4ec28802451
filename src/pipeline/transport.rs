//! Broker transport. Drives a `Pipeline` from a `Consumer`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::service::Pipeline;
use crate::broker::Consumer;

/// Statistics from a transport task.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransportStats {
    /// Number of messages successfully handled.
    pub handled: usize,
    /// Number of messages whose handler failed.
    pub failed: usize,
    /// Number of poll cycles completed.
    pub polls: usize,
}

/// Handle to a background transport task. Drop or call `stop()` to shut down.
pub struct TransportHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<TransportStats>>,
}

impl TransportHandle {
    /// Stop the transport and wait for it to finish. Returns stats.
    ///
    /// A message already being handled is finished first.
    pub async fn stop(mut self) -> TransportStats {
        self.signal_stop();
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or_default(),
            None => TransportStats::default(),
        }
    }

    /// Signal stop without waiting.
    pub fn signal_stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

/// Start consuming messages and dispatching them to the pipeline.
///
/// Spawns a tokio task that polls `consumer`, dispatches each delivery,
/// and commits it whether or not the handler succeeded (there is no
/// redelivery). Deliveries are handled one at a time, in offset order.
///
/// ## Example
///
/// ```ignore
/// let handle = pipeline::consume(
///     pipeline.clone(),
///     broker.consumer("app", "user-created"),
///     Duration::from_millis(50),
/// );
///
/// let stats = handle.stop().await;
/// ```
pub fn consume<S, C>(
    pipeline: Arc<Pipeline<S>>,
    consumer: C,
    poll_interval: Duration,
) -> TransportHandle
where
    S: Send + Sync + 'static,
    C: Consumer + 'static,
{
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let mut stats = TransportStats::default();

        loop {
            let polled = tokio::select! {
                _ = &mut stop_rx => break,
                polled = consumer.poll(poll_interval) => polled,
            };
            stats.polls += 1;

            let delivery = match polled {
                Ok(Some(delivery)) => delivery,
                Ok(None) => continue,
                Err(err) => {
                    warn!(error = %err, "consumer poll failed");
                    continue;
                }
            };

            match pipeline.dispatch(&delivery).await {
                Ok(_) => stats.handled += 1,
                Err(err) => {
                    debug!(
                        topic = %delivery.topic,
                        offset = delivery.offset,
                        error = %err,
                        "handler failed"
                    );
                    stats.failed += 1;
                }
            }

            if let Err(err) = consumer.commit(&delivery).await {
                warn!(
                    topic = %delivery.topic,
                    offset = delivery.offset,
                    error = %err,
                    "commit failed"
                );
            }
        }

        stats
    });

    TransportHandle {
        stop_tx: Some(stop_tx),
        handle: Some(handle),
    }
}
