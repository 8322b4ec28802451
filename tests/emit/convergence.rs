//! Offset convergence after the completion signal.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use awaitable_emit::broker::InMemoryBroker;
use awaitable_emit::pipeline::{self, Pipeline};
use awaitable_emit::{AwaitableEmit, BrokerError, EmitConfig, EmitError, Resolution};

use crate::support::{
    bob, converging_emitter, producer_for, start, user_created, user_service, USER_CREATED,
};

#[tokio::test(start_paused = true)]
async fn waits_for_every_group_reading_the_topic() {
    let broker = InMemoryBroker::new();
    let emitter = converging_emitter(&broker);
    let users = start(user_service(&emitter), &broker, "user-svc");

    // A slow reader without a completion hook, already caught up.
    broker.set_committed_offset("audit", USER_CREATED, 0);
    let audit = pipeline::consume(
        Arc::new(Pipeline::new(()).handler(USER_CREATED, |_ctx| async {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            Ok(json!({}))
        })),
        broker.consumer("audit", USER_CREATED),
        Duration::from_millis(10),
    );

    let started = Instant::now();
    let outcome = emitter
        .emit_message(USER_CREATED, &user_created("42", bob(100)))
        .await
        .unwrap();

    assert_eq!(outcome.resolution, Resolution::Signaled);
    let report = outcome.convergence.expect("convergence report");
    assert_eq!(report.topic, USER_CREATED);
    assert_eq!(report.target_offset, 1);
    assert_eq!(report.converged_groups, vec!["audit", "user-svc"]);
    assert!(report.polls > 1);
    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert_eq!(broker.committed_offset("audit", USER_CREATED), 1);

    users.stop().await;
    audit.stop().await;
}

#[tokio::test(start_paused = true)]
async fn groups_on_other_topics_are_ignored() {
    let broker = InMemoryBroker::new();
    broker.set_committed_offset("billing", "invoice-issued", 7);
    let emitter = converging_emitter(&broker);
    let users = start(user_service(&emitter), &broker, "user-svc");

    let outcome = emitter
        .emit_message(USER_CREATED, &user_created("42", bob(10)))
        .await
        .unwrap();

    let report = outcome.convergence.unwrap();
    assert_eq!(report.polls, 1);
    assert_eq!(report.converged_groups, vec!["user-svc"]);
    users.stop().await;
}

#[tokio::test(start_paused = true)]
async fn deadline_bounds_a_stalled_group() {
    let broker = InMemoryBroker::new();
    broker.set_committed_offset("stalled", USER_CREATED, 0);

    let config = EmitConfig {
        wait_timeout_ms: 200,
        convergence_deadline_ms: Some(300),
        ..EmitConfig::default()
    };
    let emitter = AwaitableEmit::builder(producer_for(&broker))
        .config(&config)
        .admin(Arc::new(broker.clone()))
        .build();

    let started = Instant::now();
    let err = emitter
        .emit_message(USER_CREATED, &user_created("42", bob(0)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EmitError::ConvergenceDeadline { ref topic, waited }
            if topic == USER_CREATED && waited == Duration::from_millis(300)
    ));
    assert_eq!(started.elapsed(), Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn admin_failure_rejects_after_the_signal() {
    let broker = InMemoryBroker::new();
    let emitter = converging_emitter(&broker);
    let service = user_service(&emitter);
    let users = start(service.clone(), &broker, "user-svc");
    broker.fail_admin("coordinator unavailable");

    let err = emitter
        .emit_message(USER_CREATED, &user_created("42", bob(10)))
        .await
        .unwrap_err();

    assert!(matches!(err, EmitError::Admin(BrokerError::ConnectionFailed(_))));
    // The message was still handled.
    assert_eq!(service.state().names(), vec!["Bob".to_string()]);

    broker.clear_admin_failure();
    let outcome = emitter
        .emit_message(USER_CREATED, &user_created("43", bob(10)))
        .await
        .unwrap();
    assert_eq!(outcome.convergence.unwrap().target_offset, 2);
    users.stop().await;
}

#[tokio::test(start_paused = true)]
async fn dispose_releases_the_admin_connection() {
    let broker = InMemoryBroker::new();
    let emitter = converging_emitter(&broker);
    let users = start(user_service(&emitter), &broker, "user-svc");

    emitter.dispose().await.unwrap();
    emitter.dispose().await.unwrap();
    assert!(broker.is_disconnected());

    let err = emitter
        .emit_message(USER_CREATED, &user_created("42", bob(10)))
        .await
        .unwrap_err();
    assert!(matches!(err, EmitError::Admin(BrokerError::Disconnected)));

    // Correlation-only emits keep working.
    let outcome = emitter
        .emit_retryable_message(USER_CREATED, &user_created("43", bob(10)))
        .await
        .unwrap();
    assert_eq!(outcome.resolution, Resolution::Signaled);
    users.stop().await;
}
