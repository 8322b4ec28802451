//! Correlation Bus - in-process signals keyed by correlation key.
//!
//! A handler pipeline publishes a signal when it finishes a message; an
//! emitter that produced that message waits on the same key.
//!
//! ```text
//! ┌──────────────────────┐  subscribe_once(key, kind)  ┌────────────────┐
//! │   Emission Gateway   │ ──────────────────────────▶ │                │
//! └──────────────────────┘                             │ CorrelationBus │
//! ┌──────────────────────┐  publish(key, kind, err?)   │ channel → [tx] │
//! │ Completion Hook      │ ──────────────────────────▶ │                │
//! └──────────────────────┘                             └────────────────┘
//! ```
//!
//! Signals are broadcast to every current subscriber of a channel and then
//! discarded. There is no backlog: publishing to a channel nobody waits on
//! is a no-op.

mod bus;
mod signal;

pub use bus::{CorrelationBus, Subscription};
pub use signal::{SignalKind, SignalPayload};
