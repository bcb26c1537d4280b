mod common;

use common::{Harness, device_id, modbus};
use domain::DomainEvent;
use domain::command::{CommandError, CommandResponse};
use infrastructure::config::MetricsConfig;
use serde_json::json;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_response_completes_dispatch() {
    let h = Harness::new(vec![modbus("crac-1")], MetricsConfig::default());
    let broker = h.broker.clone();

    let task = tokio::spawn(async move {
        broker
            .dispatch(&device_id("crac-1"), "set_point", json!({"celsius": 22}), None)
            .await
    });

    let commands = h.client.wait_for_commands(1).await;
    assert_eq!(commands[0].command, "set_point");
    assert_eq!(commands[0].protocol, "modbus");
    assert_eq!(commands[0].params["celsius"], 22);
    assert_eq!(h.broker.pending_count(), 1);

    let completed = h.broker.complete(
        &device_id("crac-1"),
        CommandResponse::ok(commands[0].correlation_id.clone(), json!({"applied": true})),
    );
    assert_eq!(completed.unwrap().command, "set_point");

    let reply = task.await.unwrap().unwrap();
    assert_eq!(reply.data["applied"], true);
    assert_eq!(reply.correlation_id, commands[0].correlation_id);
    assert_eq!(h.broker.pending_count(), 0);
    assert_eq!(h.events.of_type("CommandCompleted").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_times_out_and_late_response_is_dropped() {
    let h = Harness::new(vec![modbus("crac-1")], MetricsConfig::default());

    let result = h
        .broker
        .dispatch(
            &device_id("crac-1"),
            "read",
            json!({}),
            Some(Duration::from_millis(250)),
        )
        .await;

    assert_eq!(result, Err(CommandError::Timeout { timeout_ms: 250 }));
    assert_eq!(h.broker.pending_count(), 0);

    let timed_out = h.events.of_type("CommandTimedOut");
    assert_eq!(timed_out.len(), 1);
    assert!(matches!(
        &timed_out[0],
        DomainEvent::CommandTimedOut { timeout_ms: 250, .. }
    ));

    // The device answers after the deadline
    let request = &h.client.commands()[0];
    let late = h.broker.complete(
        &device_id("crac-1"),
        CommandResponse::ok(request.correlation_id.clone(), json!({})),
    );
    assert!(late.is_none());
    assert!(h.events.of_type("CommandCompleted").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_default_timeout_applies() {
    let h = Harness::new(vec![modbus("crac-1")], MetricsConfig::default());

    let started = tokio::time::Instant::now();
    let result = h
        .broker
        .dispatch(&device_id("crac-1"), "read", json!({}), None)
        .await;

    assert_eq!(result, Err(CommandError::Timeout { timeout_ms: 5000 }));
    assert!(started.elapsed() >= Duration::from_millis(5000));
}

#[tokio::test(start_paused = true)]
async fn test_response_on_other_device_topic_stays_pending() {
    let h = Harness::new(
        vec![modbus("crac-1"), modbus("crac-2")],
        MetricsConfig::default(),
    );
    let broker = h.broker.clone();
    let task = tokio::spawn(async move {
        broker
            .dispatch(&device_id("crac-1"), "read", json!({}), None)
            .await
    });

    let commands = h.client.wait_for_commands(1).await;
    let id = commands[0].correlation_id.clone();

    assert!(
        h.broker
            .complete(&device_id("crac-2"), CommandResponse::ok(id.clone(), json!({})))
            .is_none()
    );
    assert_eq!(h.broker.pending_count(), 1);

    assert!(
        h.broker
            .complete(&device_id("crac-1"), CommandResponse::ok(id, json!({"t": 21})))
            .is_some()
    );
    let reply = task.await.unwrap().unwrap();
    assert_eq!(reply.data["t"], 21);
}

#[tokio::test(start_paused = true)]
async fn test_error_response_is_rejected() {
    let h = Harness::new(vec![modbus("crac-1")], MetricsConfig::default());
    let broker = h.broker.clone();
    let task = tokio::spawn(async move {
        broker
            .dispatch(&device_id("crac-1"), "reboot", json!({}), None)
            .await
    });

    let commands = h.client.wait_for_commands(1).await;
    h.broker.complete(
        &device_id("crac-1"),
        CommandResponse::error(commands[0].correlation_id.clone(), "interlock engaged"),
    );

    assert_eq!(
        task.await.unwrap(),
        Err(CommandError::Rejected("interlock engaged".into()))
    );
    match &h.events.of_type("CommandCompleted")[0] {
        DomainEvent::CommandCompleted { success, .. } => assert!(!success),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_unknown_and_disabled_devices() {
    let mut disabled = modbus("ups-9");
    disabled.enabled = false;
    let h = Harness::new(vec![disabled], MetricsConfig::default());

    assert_eq!(
        h.broker
            .dispatch(&device_id("nope"), "read", json!({}), None)
            .await,
        Err(CommandError::UnknownDevice("nope".into()))
    );
    assert_eq!(
        h.broker
            .dispatch(&device_id("ups-9"), "read", json!({}), None)
            .await,
        Err(CommandError::DeviceDisabled("ups-9".into()))
    );
    assert!(h.client.commands().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_busy_when_too_many_in_flight() {
    let h = Harness::with_limits(
        vec![modbus("crac-1")],
        MetricsConfig::default(),
        Duration::from_millis(5000),
        1,
    );
    let broker = h.broker.clone();
    let _first = tokio::spawn(async move {
        broker
            .dispatch(&device_id("crac-1"), "read", json!({}), None)
            .await
    });
    h.client.wait_for_commands(1).await;

    assert_eq!(
        h.broker
            .dispatch(&device_id("crac-1"), "read", json!({}), None)
            .await,
        Err(CommandError::Busy { limit: 1 })
    );
    assert_eq!(h.broker.pending().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_publish_failure_clears_pending() {
    let h = Harness::new(vec![modbus("crac-1")], MetricsConfig::default());
    h.client.fail_publish.store(true, Ordering::Relaxed);

    let result = h
        .broker
        .dispatch(&device_id("crac-1"), "read", json!({}), None)
        .await;

    assert!(matches!(result, Err(CommandError::Publish(_))));
    assert_eq!(h.broker.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_dispatch_releases_slot() {
    let h = Harness::with_limits(
        vec![modbus("crac-1")],
        MetricsConfig::default(),
        Duration::from_millis(5000),
        1,
    );
    let broker = h.broker.clone();
    let task = tokio::spawn(async move {
        broker
            .dispatch(&device_id("crac-1"), "read", json!({}), None)
            .await
    });
    h.client.wait_for_commands(1).await;
    assert_eq!(h.broker.pending_count(), 1);

    // The HTTP caller went away
    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert_eq!(h.broker.pending_count(), 0);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.broker.pending_count(), 0);

    let result = h
        .broker
        .dispatch(&device_id("crac-1"), "read", json!({}), None)
        .await;
    assert_eq!(result, Err(CommandError::Timeout { timeout_ms: 5000 }));
    assert_eq!(h.client.commands().len(), 2);
}
