//! Completion Signal Hook - turns handler outcomes into correlation signals.
//!
//! Attach it to a `Pipeline` (or call it from any other handler framework)
//! so every handled message publishes `success` or `error` for its
//! correlation key. The hook only observes: errors still propagate through
//! the pipeline untouched.

use std::sync::Arc;

use tracing::debug;

use crate::broker::Delivery;
use crate::correlation::{CorrelationBus, SignalKind};
use crate::error::SharedError;
use crate::pipeline::{Outcome, PostInvocationHook};

/// Extracts the correlation key from an inbound message.
pub type KeyExtractor = Arc<dyn Fn(&Delivery) -> Option<String> + Send + Sync>;

/// Publishes a completion signal for every handled message.
#[derive(Clone)]
pub struct CompletionHook {
    bus: CorrelationBus,
    extract_key: KeyExtractor,
}

impl CompletionHook {
    /// Create a hook that correlates on the message key.
    pub fn new(bus: CorrelationBus) -> Self {
        Self::with_key_extractor(bus, |delivery: &Delivery| delivery.key.clone())
    }

    /// Create a hook with a custom key extractor, e.g. one reading a header.
    pub fn with_key_extractor<F>(bus: CorrelationBus, extract_key: F) -> Self
    where
        F: Fn(&Delivery) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            bus,
            extract_key: Arc::new(extract_key),
        }
    }

    /// Publish the success signal for `key`.
    pub fn succeeded(&self, key: &str) -> usize {
        let notified = self.bus.publish(key, SignalKind::Success, None);
        debug!(key, notified, "completion signal published");
        notified
    }

    /// Publish the error signal for `key`, carrying `err`.
    pub fn failed(&self, key: &str, err: SharedError) -> usize {
        let notified = self.bus.publish(key, SignalKind::Error, Some(err));
        debug!(key, notified, "error signal published");
        notified
    }

    /// The bus this hook publishes on.
    pub fn bus(&self) -> &CorrelationBus {
        &self.bus
    }
}

impl PostInvocationHook for CompletionHook {
    fn after_invocation(&self, delivery: &Delivery, outcome: &Outcome) {
        let Some(key) = (self.extract_key)(delivery) else {
            debug!(topic = %delivery.topic, offset = delivery.offset, "no correlation key, skipping signal");
            return;
        };

        match outcome {
            Ok(_) => {
                self.succeeded(&key);
            }
            Err(err) => {
                let err: SharedError = Arc::clone(err) as SharedError;
                self.failed(&key, err);
            }
        }
    }
}
