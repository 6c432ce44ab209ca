use actix_web::test;
use eats_partner_engine::db_types::{EventStatus, WebhookEvent};
use serde_json::json;

use crate::{
    endpoint_tests::{
        helpers::{scratch_db, signed_envelope, TEST_API_KEY},
        mocks::StubGateway,
    },
    test_app,
};

#[actix_web::test]
async fn webhook_is_acknowledged_and_stored() {
    let db = scratch_db().await;
    let (app, _rx) = test_app!(db, StubGateway::default());
    let app = test::init_service(app).await;

    let (body, sig, ts) = signed_envelope("evt-1", "orders.notification", json!({"order_id": "O1", "store_id": "S1"}));
    let req = test::TestRequest::post()
        .uri("/webhook")
        .insert_header(("X-Signature", sig))
        .insert_header(("X-Timestamp", ts))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let ack: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(ack["received"], true);
    assert_eq!(ack["event_id"], "evt-1");

    // The stored event is visible through the operator API
    let req = test::TestRequest::get().uri("/api/events").insert_header(("X-Api-Key", TEST_API_KEY)).to_request();
    let events: Vec<WebhookEvent> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id.as_str(), "evt-1");
    assert_eq!(events[0].status, EventStatus::Pending);
}

#[actix_web::test]
async fn duplicate_webhook_is_acknowledged_without_a_second_row() {
    let db = scratch_db().await;
    let (app, _rx) = test_app!(db, StubGateway::default());
    let app = test::init_service(app).await;

    let (body, sig, ts) = signed_envelope("evt-2", "orders.notification", json!({"order_id": "O2", "store_id": "S1"}));
    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/webhook")
            .insert_header(("X-Signature", sig.clone()))
            .insert_header(("X-Timestamp", ts.clone()))
            .set_payload(body.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }
    let req = test::TestRequest::get().uri("/api/events").insert_header(("X-Api-Key", TEST_API_KEY)).to_request();
    let events: Vec<WebhookEvent> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(events.len(), 1);
}

#[actix_web::test]
async fn bad_signature_is_rejected_with_nothing_stored() {
    let db = scratch_db().await;
    let (app, _rx) = test_app!(db, StubGateway::default());
    let app = test::init_service(app).await;

    let (body, _sig, ts) = signed_envelope("evt-3", "orders.notification", json!({"order_id": "O3"}));
    let req = test::TestRequest::post()
        .uri("/webhook")
        .insert_header(("X-Signature", "deadbeef"))
        .insert_header(("X-Timestamp", ts))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 401);

    let req = test::TestRequest::get().uri("/api/events").insert_header(("X-Api-Key", TEST_API_KEY)).to_request();
    let events: Vec<WebhookEvent> = test::call_and_read_body_json(&app, req).await;
    assert!(events.is_empty());
}

#[actix_web::test]
async fn stale_timestamp_is_rejected_even_with_a_valid_hmac() {
    let db = scratch_db().await;
    let (app, _rx) = test_app!(db, StubGateway::default());
    let app = test::init_service(app).await;

    let body = serde_json::json!({
        "metadata": { "event_id": "evt-4", "event_type": "orders.notification", "event_time": chrono::Utc::now() },
        "data": { "order_id": "O4" },
    })
    .to_string();
    // Valid signature over a timestamp from ten minutes ago, twice the allowed skew
    let ts = (chrono::Utc::now() - chrono::Duration::minutes(10)).timestamp();
    let sig = eats_partner_engine::helpers::calculate_signature(
        crate::endpoint_tests::helpers::TEST_WEBHOOK_SECRET,
        ts,
        body.as_bytes(),
    );
    let req = test::TestRequest::post()
        .uri("/webhook")
        .insert_header(("X-Signature", sig))
        .insert_header(("X-Timestamp", ts.to_string()))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 401);
}

#[actix_web::test]
async fn malformed_envelope_is_a_validation_error() {
    let db = scratch_db().await;
    let (app, _rx) = test_app!(db, StubGateway::default());
    let app = test::init_service(app).await;

    let body = r#"{"not": "an envelope"}"#.to_string();
    let ts = chrono::Utc::now().timestamp();
    let sig = eats_partner_engine::helpers::calculate_signature(
        crate::endpoint_tests::helpers::TEST_WEBHOOK_SECRET,
        ts,
        body.as_bytes(),
    );
    let req = test::TestRequest::post()
        .uri("/webhook")
        .insert_header(("X-Signature", sig))
        .insert_header(("X-Timestamp", ts.to_string()))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[actix_web::test]
async fn operator_routes_require_the_api_key() {
    let db = scratch_db().await;
    let (app, _rx) = test_app!(db, StubGateway::default());
    let app = test::init_service(app).await;

    let req = test::TestRequest::get().uri("/api/events").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 401);

    let req = test::TestRequest::get().uri("/api/events").insert_header(("X-Api-Key", "wrong-key")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 401);
}

#[actix_web::test]
async fn retrying_a_pending_event_is_rejected() {
    let db = scratch_db().await;
    let (app, _rx) = test_app!(db, StubGateway::default());
    let app = test::init_service(app).await;

    let (body, sig, ts) = signed_envelope("evt-5", "orders.notification", json!({"order_id": "O5", "store_id": "S1"}));
    let req = test::TestRequest::post()
        .uri("/webhook")
        .insert_header(("X-Signature", sig))
        .insert_header(("X-Timestamp", ts))
        .set_payload(body)
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get().uri("/api/events").insert_header(("X-Api-Key", TEST_API_KEY)).to_request();
    let events: Vec<WebhookEvent> = test::call_and_read_body_json(&app, req).await;
    let id = events[0].id;
    let req = test::TestRequest::post()
        .uri(&format!("/api/events/{id}/retry"))
        .insert_header(("X-Api-Key", TEST_API_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
}
