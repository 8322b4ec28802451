//! pipeline: topic-routed message handlers with post-invocation hooks.
//!
//! Register async handlers per topic on a `Pipeline`, attach hooks that
//! observe every outcome, and drive it from a broker `Consumer` with
//! `consume`.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use awaitable_emit::pipeline::{self, Pipeline};
//! use serde_json::json;
//!
//! let emitter = AwaitableEmit::new(move || producer.clone());
//!
//! let pipeline = Arc::new(
//!     Pipeline::new(AppState::default())
//!         .handler("user-created", |ctx| async move {
//!             let user = ctx.input::<User>()?;
//!             ctx.state().save(user).await;
//!             Ok(json!({}))
//!         })
//!         .hook(emitter.completion_hook()),
//! );
//!
//! let handle = pipeline::consume(pipeline, broker.consumer("app", "user-created"), Duration::from_millis(50));
//!
//! emitter.emit_message("user-created", &json!({ "key": "42", "value": { "name": "Bob" } })).await?;
//!
//! let stats = handle.stop().await;
//! ```
//!
//! ## Hooks
//!
//! A hook sees the delivery and the handler's outcome after every
//! invocation. Hooks never alter the outcome: an error is handed to every
//! hook and then returned to the caller unchanged, as the same `Arc`.

mod context;
mod error;
mod service;
mod transport;

pub use context::Context;
pub use error::HandlerError;
pub use service::{Outcome, Pipeline, PostInvocationHook};
pub use transport::{consume, TransportHandle, TransportStats};
