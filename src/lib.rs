//! Emit a message to a broker and wait until it was handled.
//!
//! `AwaitableEmit` produces a message, then waits for the handler consuming
//! it to publish a completion signal keyed by the message's `key`. A
//! `CompletionHook` attached to the handler pipeline publishes that signal.
//! With an administrative client configured the emitter additionally waits
//! until every consumer group reading the topic has committed its latest
//! offset.
//!
//! Intended for integration tests that need deterministic "message was
//! handled" points rather than sleeps.

pub mod broker;
pub mod config;
pub mod correlation;
pub mod error;
mod gateway;
pub mod hook;
pub mod monitor;
pub mod pipeline;

pub use config::EmitConfig;
pub use correlation::{CorrelationBus, SignalKind};
pub use error::{BrokerError, EmitError, SharedError};
pub use gateway::{AwaitableEmit, AwaitableEmitBuilder, EmitOutcome, ProducerFactory, Resolution};
pub use hook::CompletionHook;
pub use monitor::{ConvergenceReport, OffsetMonitor};
