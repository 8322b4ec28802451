//! Full round trip: emit, consume, handle, signal.

use std::time::Duration;

use tokio::time::Instant;

use awaitable_emit::broker::InMemoryBroker;
use awaitable_emit::Resolution;

use crate::support::{bob, emitter, start, user_created, user_service, USER_CREATED};

#[tokio::test(start_paused = true)]
async fn resolves_when_handler_finishes() {
    let broker = InMemoryBroker::new();
    let emitter = emitter(&broker);
    let service = user_service(&emitter);
    let transport = start(service.clone(), &broker, "user-svc");

    let started = Instant::now();
    let outcome = emitter
        .emit_message(USER_CREATED, &user_created("42", bob(2000)))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome.resolution, Resolution::Signaled);
    assert!(outcome.convergence.is_none());
    assert!(elapsed >= Duration::from_millis(2000), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(5000), "{elapsed:?}");
    assert_eq!(service.state().names(), vec!["Bob".to_string()]);

    let stats = transport.stop().await;
    assert_eq!(stats.handled, 1);
    assert_eq!(broker.committed_offset("user-svc", USER_CREATED), 1);
}

#[tokio::test(start_paused = true)]
async fn message_reaches_the_topic_with_its_key() {
    let broker = InMemoryBroker::new();
    let emitter = emitter(&broker);
    let transport = start(user_service(&emitter), &broker, "user-svc");

    emitter
        .emit_message(USER_CREATED, &user_created("42", bob(0)))
        .await
        .unwrap();

    let messages = broker.messages(USER_CREATED);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].key.as_deref(), Some("42"));
    assert_eq!(messages[0].json_value()["name"], "Bob");

    transport.stop().await;
}

#[tokio::test(start_paused = true)]
async fn sequential_emits_each_wait_for_their_own_handling() {
    let broker = InMemoryBroker::new();
    let emitter = emitter(&broker);
    let service = user_service(&emitter);
    let transport = start(service.clone(), &broker, "user-svc");

    for (key, delay) in [("1", 100), ("2", 300), ("3", 50)] {
        let started = Instant::now();
        let outcome = emitter
            .emit_message(USER_CREATED, &user_created(key, bob(delay)))
            .await
            .unwrap();
        assert_eq!(outcome.resolution, Resolution::Signaled);
        assert!(started.elapsed() >= Duration::from_millis(delay));
    }

    assert_eq!(service.state().names().len(), 3);
    assert_eq!(emitter.correlation_bus().channel_count(), 0);
    transport.stop().await;
}
