//! Concurrent emissions correlate on their own keys.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;

use awaitable_emit::broker::{InMemoryBroker, OutboundMessage, Producer};
use awaitable_emit::pipeline::{self, Pipeline};
use awaitable_emit::{AwaitableEmit, BrokerError, CorrelationBus, Resolution, SignalKind};

use crate::support::{bob, emitter, start, user_created, user_service, NewUser, USER_CREATED};

#[tokio::test(start_paused = true)]
async fn concurrent_emits_resolve_independently() {
    let broker = InMemoryBroker::new();
    let emitter = emitter(&broker);
    let transport = start(user_service(&emitter), &broker, "user-svc");

    let started = Instant::now();
    let emitter = &emitter;
    let timed = move |key: &'static str, delay: u64| async move {
        let outcome = emitter
            .emit_message(USER_CREATED, &user_created(key, bob(delay)))
            .await
            .unwrap();
        (outcome.resolution, started.elapsed())
    };

    let (a, b, c) = tokio::join!(timed("a", 300), timed("b", 200), timed("c", 100));

    // Handled one at a time, in produce order.
    assert_eq!(a, (Resolution::Signaled, Duration::from_millis(300)));
    assert_eq!(b, (Resolution::Signaled, Duration::from_millis(500)));
    assert_eq!(c, (Resolution::Signaled, Duration::from_millis(600)));

    transport.stop().await;
}

#[tokio::test(start_paused = true)]
async fn signal_for_another_key_does_not_resolve() {
    let broker = InMemoryBroker::new();
    let emitter = emitter(&broker);
    let bus = emitter.correlation_bus().clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.publish("43", SignalKind::Success, None);
    });

    let started = Instant::now();
    let outcome = emitter
        .emit_message(USER_CREATED, &user_created("42", bob(0)))
        .await
        .unwrap();

    assert_eq!(outcome.resolution, Resolution::TimedOut);
    assert_eq!(started.elapsed(), emitter.wait_timeout());
}

#[tokio::test(start_paused = true)]
async fn numeric_keys_correlate_by_their_text() {
    let broker = InMemoryBroker::new();
    let emitter = emitter(&broker);
    let transport = start(user_service(&emitter), &broker, "user-svc");

    let outcome = emitter
        .emit_message(
            USER_CREATED,
            &serde_json::json!({ "key": 7, "value": bob(20) }),
        )
        .await
        .unwrap();

    assert_eq!(outcome.resolution, Resolution::Signaled);
    assert_eq!(broker.messages(USER_CREATED)[0].key.as_deref(), Some("7"));
    transport.stop().await;
}

#[tokio::test(start_paused = true)]
async fn later_emit_can_finish_first() {
    let broker = InMemoryBroker::new();
    let emitter = emitter(&broker);

    // One consumer per topic, so the two handlers run concurrently.
    let service = Arc::new(
        Pipeline::new(())
            .handler("slow", |ctx| async move {
                let user = ctx.input::<NewUser>()?;
                tokio::time::sleep(Duration::from_millis(user.delay_ms)).await;
                Ok(json!({}))
            })
            .handler("fast", |ctx| async move {
                let user = ctx.input::<NewUser>()?;
                tokio::time::sleep(Duration::from_millis(user.delay_ms)).await;
                Ok(json!({}))
            })
            .hook(emitter.completion_hook()),
    );
    let slow = pipeline::consume(service.clone(), broker.consumer("svc", "slow"), Duration::from_millis(10));
    let fast = pipeline::consume(service, broker.consumer("svc", "fast"), Duration::from_millis(10));

    let started = Instant::now();
    let emitter = &emitter;
    let timed = move |topic: &'static str, key: &'static str, delay: u64| async move {
        let outcome = emitter
            .emit_message(topic, &user_created(key, bob(delay)))
            .await
            .unwrap();
        (outcome.resolution, started.elapsed())
    };

    let (first, second) = tokio::join!(timed("slow", "k1", 300), timed("fast", "k2", 100));

    assert_eq!(second, (Resolution::Signaled, Duration::from_millis(100)));
    assert_eq!(first, (Resolution::Signaled, Duration::from_millis(300)));

    slow.stop().await;
    fast.stop().await;
}

/// Handles the message before acknowledging the write, so the completion
/// signal is published before the emitter has subscribed.
struct HandledBeforeAck {
    broker: InMemoryBroker,
    bus: CorrelationBus,
    notified: std::sync::Mutex<Vec<usize>>,
}

#[async_trait]
impl Producer for HandledBeforeAck {
    async fn produce(&self, topic: &str, message: OutboundMessage) -> Result<(), BrokerError> {
        let key = message.key.clone().unwrap_or_default();
        self.broker.produce(topic, message).await?;
        let notified = self.bus.publish(&key, SignalKind::Success, None);
        self.notified.lock().unwrap().push(notified);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn signal_before_ack_is_lost_and_falls_back_to_timeout() {
    let bus = CorrelationBus::new();
    let producer = Arc::new(HandledBeforeAck {
        broker: InMemoryBroker::new(),
        bus: bus.clone(),
        notified: Default::default(),
    });

    let factory = Arc::clone(&producer);
    let emitter = AwaitableEmit::builder(move || Arc::clone(&factory) as Arc<dyn Producer>)
        .correlation_bus(bus)
        .wait_timeout(Duration::from_millis(700))
        .build();

    let started = Instant::now();
    let outcome = emitter
        .emit_message(USER_CREATED, &user_created("42", bob(0)))
        .await
        .unwrap();

    assert_eq!(*producer.notified.lock().unwrap(), vec![0]);
    assert_eq!(outcome.resolution, Resolution::TimedOut);
    assert_eq!(started.elapsed(), Duration::from_millis(700));
    assert_eq!(emitter.correlation_bus().channel_count(), 0);
}
