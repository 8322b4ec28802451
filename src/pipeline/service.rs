//! Pipeline handler registry, dispatch, and post-invocation hooks.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use super::context::Context;
use super::error::HandlerError;
use crate::broker::Delivery;

/// Outcome of one handler invocation as seen by hooks and callers.
///
/// Errors are shared so every hook and the caller observe the same value.
pub type Outcome = Result<Value, Arc<HandlerError>>;

type BoxedHandler<S> =
    Box<dyn Fn(Context<S>) -> BoxFuture<'static, Result<Value, HandlerError>> + Send + Sync>;

/// Logic run after every handler invocation, success or failure.
pub trait PostInvocationHook: Send + Sync {
    /// Observe the outcome of handling `delivery`.
    fn after_invocation(&self, delivery: &Delivery, outcome: &Outcome);
}

/// Routes inbound messages to the handler registered for their topic.
///
/// Generic over `S`, shared state handed to handlers through
/// `ctx.state()`.
pub struct Pipeline<S> {
    state: Arc<S>,
    handlers: HashMap<String, BoxedHandler<S>>,
    hooks: Vec<Arc<dyn PostInvocationHook>>,
}

impl<S: Send + Sync + 'static> Pipeline<S> {
    /// Create a pipeline with the given shared state.
    pub fn new(state: S) -> Self {
        Self {
            state: Arc::new(state),
            handlers: HashMap::new(),
            hooks: Vec::new(),
        }
    }

    /// Register the handler for `topic`.
    ///
    /// Returns `self` for chaining.
    pub fn handler<F, Fut>(mut self, topic: &str, handler: F) -> Self
    where
        F: Fn(Context<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        self.handlers.insert(
            topic.to_string(),
            Box::new(move |ctx| handler(ctx).boxed()),
        );
        self
    }

    /// Attach a hook run after every handler invocation, in registration order.
    pub fn hook(mut self, hook: Arc<dyn PostInvocationHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Handle one delivery.
    ///
    /// Runs the topic's handler, hands the outcome to every hook, then
    /// returns it unchanged. Deliveries for topics without a handler are
    /// rejected with `UnknownTopic` before any hook runs.
    pub async fn dispatch(&self, delivery: &Delivery) -> Outcome {
        let handler = self
            .handlers
            .get(&delivery.topic)
            .ok_or_else(|| Arc::new(HandlerError::UnknownTopic(delivery.topic.clone())))?;

        let ctx = Context::new(delivery, Arc::clone(&self.state));
        let outcome = handler(ctx).await.map_err(Arc::new);

        for hook in &self.hooks {
            hook.after_invocation(delivery, &outcome);
        }

        outcome
    }

    /// List topics with a registered handler.
    pub fn topics(&self) -> Vec<&str> {
        self.handlers.keys().map(|s| s.as_str()).collect()
    }

    /// Get the shared state.
    pub fn state(&self) -> &Arc<S> {
        &self.state
    }
}
