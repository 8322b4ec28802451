//! `emit_retryable_message` waits for success or the timeout only.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use awaitable_emit::broker::InMemoryBroker;
use awaitable_emit::{AwaitableEmit, Resolution};

use crate::support::{bob, producer_for, start, user_created, user_service, NewUser, USER_CREATED};

fn short_wait(broker: &InMemoryBroker) -> AwaitableEmit {
    AwaitableEmit::builder(producer_for(broker))
        .wait_timeout(Duration::from_millis(500))
        .admin(Arc::new(broker.clone()))
        .build()
}

#[tokio::test(start_paused = true)]
async fn resolves_on_success() {
    let broker = InMemoryBroker::new();
    let emitter = short_wait(&broker);
    let transport = start(user_service(&emitter), &broker, "user-svc");

    let started = Instant::now();
    let outcome = emitter
        .emit_retryable_message(USER_CREATED, &user_created("42", bob(120)))
        .await
        .unwrap();

    assert_eq!(outcome.resolution, Resolution::Signaled);
    assert_eq!(started.elapsed(), Duration::from_millis(120));
    // Convergence is never awaited on this path.
    assert!(outcome.convergence.is_none());
    transport.stop().await;
}

#[tokio::test(start_paused = true)]
async fn handler_error_falls_back_to_timeout() {
    let broker = InMemoryBroker::new();
    let emitter = short_wait(&broker);
    let transport = start(user_service(&emitter), &broker, "user-svc");

    let user = NewUser {
        name: "Flaky".into(),
        delay_ms: 20,
        reject: Some("downstream unavailable".into()),
    };
    let started = Instant::now();
    let outcome = emitter
        .emit_retryable_message(USER_CREATED, &user_created("42", user))
        .await
        .unwrap();

    assert_eq!(outcome.resolution, Resolution::TimedOut);
    assert_eq!(started.elapsed(), Duration::from_millis(500));
    assert_eq!(emitter.correlation_bus().channel_count(), 0);
    transport.stop().await;
}
