mod support;

use eats_partner_engine::{
    db_types::{EventStatus, OrderStatusType},
    dispatch::{dispatch_channel, run_dispatcher},
    events::EventProducers,
    lifecycle::OrderAction,
    traits::EventQueryFilter,
    AppliedAction,
    EventFlowApi,
    ProcessOutcome,
    SqliteDatabase,
};
use serde_json::json;
use support::{envelope, prepare_test_env, random_db_path, RecordingGateway};

async fn new_api(url: &str, gateway: RecordingGateway) -> EventFlowApi<SqliteDatabase, RecordingGateway> {
    prepare_test_env(url).await;
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating database");
    EventFlowApi::new(db, gateway, EventProducers::default())
}

#[tokio::test]
async fn duplicate_delivery_creates_one_row_and_one_side_effect() {
    let url = random_db_path();
    let gateway = RecordingGateway::default();
    let api = new_api(&url, gateway).await;

    let body = envelope("evt-1", "orders.notification", json!({ "order_id": "O1", "store_id": "S1", "total": 23.5 }));
    let first = api.ingest(&body).await.unwrap();
    assert!(!first.is_duplicate());
    let second = api.ingest(&body).await.unwrap();
    assert!(second.is_duplicate());
    assert_eq!(first.event().id, second.event().id);

    let outcome = api.process_event(first.event().id).await;
    assert!(matches!(outcome, ProcessOutcome::Processed));
    // Reprocessing the same event is acknowledged without running the handler again
    let outcome = api.process_event(first.event().id).await;
    assert!(matches!(outcome, ProcessOutcome::Processed));

    let events = api.search_events(EventQueryFilter::default()).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, EventStatus::Processed);
    assert_eq!(events[0].attempts, 1);
    let order = api.orders().fetch_order(&"O1".parse().unwrap()).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);
    assert_eq!(order.version, 1);
}

#[tokio::test]
async fn notification_then_accept_then_duplicate_notification() {
    let url = random_db_path();
    let gateway = RecordingGateway::default();
    let api = new_api(&url, gateway.clone()).await;

    let body = envelope("evt-10", "orders.notification", json!({ "order_id": "O1", "store_id": "S1", "total": 12.0 }));
    let inserted = api.ingest(&body).await.unwrap();
    let outcome = api.process_event(inserted.event().id).await;
    assert!(matches!(outcome, ProcessOutcome::Processed));

    let oid = "O1".parse().unwrap();
    let applied = api.orders().apply_action(&oid, &OrderAction::Accept { eta_minutes: 20 }, None).await.unwrap();
    let order = match applied {
        AppliedAction::Transitioned { order, side_effects } => {
            assert_eq!(side_effects.len(), 1);
            order
        },
        other => panic!("Expected a transition, got {other:?}"),
    };
    assert_eq!(order.status, OrderStatusType::Accepted);
    assert_eq!(order.eta_minutes, Some(20));
    assert_eq!(order.version, 2);

    // A duplicate delivery of the original notification must not touch the order
    let dup = api.ingest(&body).await.unwrap();
    assert!(dup.is_duplicate());
    let outcome = api.process_event(dup.event().id).await;
    assert!(matches!(outcome, ProcessOutcome::Processed));
    let order = api.orders().fetch_order(&oid).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Accepted);
    assert_eq!(order.version, 2);
}

#[tokio::test]
async fn transient_failures_retry_until_the_fourth_attempt_succeeds() {
    let url = random_db_path();
    let gateway = RecordingGateway::failing_ready(3);
    let api = new_api(&url, gateway.clone()).await;

    // Walk the order to Preparing so that a READY_FOR_PICKUP status update triggers the ready notification
    let notif = envelope("evt-20", "orders.notification", json!({ "order_id": "O3", "store_id": "S1", "total": 9.5 }));
    let inserted = api.ingest(&notif).await.unwrap();
    api.process_event(inserted.event().id).await;
    let oid = "O3".parse().unwrap();
    api.orders().apply_action(&oid, &OrderAction::Accept { eta_minutes: 15 }, None).await.unwrap();
    api.orders().apply_action(&oid, &OrderAction::StartPreparing, None).await.unwrap();

    let update = envelope(
        "evt-21",
        "orders.status_update",
        json!({ "order_id": "O3", "new_status": "READY_FOR_PICKUP", "order_version": 3 }),
    );
    let event_id = api.ingest(&update).await.unwrap().event().id;

    for expected_attempt in 1..=3 {
        let outcome = api.process_event(event_id).await;
        assert!(matches!(outcome, ProcessOutcome::Retry { .. }), "attempt {expected_attempt} should be retried");
        let event = api.fetch_event(event_id).await.unwrap().unwrap();
        assert_eq!(event.status, EventStatus::Retrying);
        assert_eq!(event.attempts, expected_attempt);
    }
    let outcome = api.process_event(event_id).await;
    assert!(matches!(outcome, ProcessOutcome::Processed));
    let event = api.fetch_event(event_id).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Processed);
    assert_eq!(event.attempts, 4);
    assert_eq!(gateway.readies.load(std::sync::atomic::Ordering::SeqCst), 1);
    let order = api.orders().fetch_order(&oid).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::ReadyForPickup);
}

#[tokio::test]
async fn stale_status_update_is_discarded() {
    let url = random_db_path();
    let api = new_api(&url, RecordingGateway::default()).await;

    let notif = envelope("evt-30", "orders.notification", json!({ "order_id": "O4", "store_id": "S2", "total": 5.0 }));
    let inserted = api.ingest(&notif).await.unwrap();
    api.process_event(inserted.event().id).await;
    let oid = "O4".parse().unwrap();
    api.orders().apply_action(&oid, &OrderAction::Accept { eta_minutes: 10 }, None).await.unwrap();
    api.orders().apply_action(&oid, &OrderAction::StartPreparing, None).await.unwrap();
    // version is now 3; an update stamped with version 1 is stale
    let update = envelope(
        "evt-31",
        "orders.status_update",
        json!({ "order_id": "O4", "new_status": "CANCELLED", "order_version": 1 }),
    );
    let event_id = api.ingest(&update).await.unwrap().event().id;
    let outcome = api.process_event(event_id).await;
    assert!(matches!(outcome, ProcessOutcome::Processed));
    let order = api.orders().fetch_order(&oid).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Preparing);
    assert_eq!(order.version, 3);
}

#[tokio::test]
async fn illegal_transition_fails_the_event_without_retry() {
    let url = random_db_path();
    let api = new_api(&url, RecordingGateway::default()).await;

    let notif = envelope("evt-40", "orders.notification", json!({ "order_id": "O5", "store_id": "S2", "total": 7.0 }));
    let inserted = api.ingest(&notif).await.unwrap();
    api.process_event(inserted.event().id).await;
    // DELIVERED straight from Pending skips the whole fulfillment chain
    let update = envelope("evt-41", "orders.status_update", json!({ "order_id": "O5", "new_status": "DELIVERED" }));
    let event_id = api.ingest(&update).await.unwrap().event().id;
    let outcome = api.process_event(event_id).await;
    assert!(matches!(outcome, ProcessOutcome::Failed));
    let event = api.fetch_event(event_id).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Failed);
    assert_eq!(event.attempts, 1);
    assert!(event.last_error.unwrap().contains("not legal"));
}

#[tokio::test]
async fn unknown_event_type_is_stored_failed_and_never_retried() {
    let url = random_db_path();
    let api = new_api(&url, RecordingGateway::default()).await;

    let body = envelope("evt-50", "orders.telepathy", json!({ "order_id": "O6" }));
    let event_id = api.ingest(&body).await.unwrap().event().id;
    let outcome = api.process_event(event_id).await;
    assert!(matches!(outcome, ProcessOutcome::Failed));
    let event = api.fetch_event(event_id).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Failed);
    assert!(event.last_error.unwrap().contains("Unknown webhook event type"));
}

#[tokio::test]
async fn manual_retry_resets_attempts_only_on_request() {
    let url = random_db_path();
    let api = new_api(&url, RecordingGateway::default()).await;

    let body = envelope("evt-60", "orders.cancel", json!({ "order_id": "O-missing", "cancel_reason": "FRAUD" }));
    let event_id = api.ingest(&body).await.unwrap().event().id;
    // The order never arrives, so the cancel keeps failing transiently; drive it to exhaustion
    for _ in 0..8 {
        api.process_event(event_id).await;
    }
    let event = api.fetch_event(event_id).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Failed);
    assert_eq!(event.attempts, 8);

    let rearmed = api.manual_retry(event_id, false).await.unwrap();
    assert_eq!(rearmed.status, EventStatus::Pending);
    assert_eq!(rearmed.attempts, 8);

    // Pending events are not retryable again until they fail
    assert!(api.manual_retry(event_id, true).await.is_err());
    api.process_event(event_id).await;
    let event = api.fetch_event(event_id).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Failed);
    let rearmed = api.manual_retry(event_id, true).await.unwrap();
    assert_eq!(rearmed.attempts, 0);
}

#[tokio::test]
async fn store_events_are_audit_only() {
    let url = random_db_path();
    let api = new_api(&url, RecordingGateway::default()).await;

    let body = envelope("evt-70", "store.provisioned", json!({ "store_id": "S9" }));
    let event_id = api.ingest(&body).await.unwrap().event().id;
    let outcome = api.process_event(event_id).await;
    assert!(matches!(outcome, ProcessOutcome::Processed));
}

#[tokio::test]
async fn dispatcher_processes_submitted_events() {
    let url = random_db_path();
    let api = new_api(&url, RecordingGateway::default()).await;

    let body = envelope("evt-80", "orders.notification", json!({ "order_id": "O9", "store_id": "S3", "total": 3.0 }));
    let event_id = api.ingest(&body).await.unwrap().event().id;
    let (handle, rx) = dispatch_channel();
    let dispatcher = tokio::spawn(run_dispatcher(api.clone(), rx, 4));
    handle.submit(event_id).await;
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    let event = api.fetch_event(event_id).await.unwrap().unwrap();
    assert_eq!(event.status, EventStatus::Processed);
    drop(handle);
    dispatcher.await.unwrap();
}
