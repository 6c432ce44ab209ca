use std::sync::atomic::Ordering;

use actix_web::test;
use eats_partner_engine::{
    db_types::{NewOrder, Order, OrderId},
    events::EventProducers,
    traits::OrderManagement,
    OrderFlowApi,
    SqliteDatabase,
};
use epg_common::Money;
use serde_json::json;

use crate::{
    endpoint_tests::{
        helpers::{scratch_db, TEST_API_KEY},
        mocks::StubGateway,
    },
    test_app,
};

async fn seed_order(db: &SqliteDatabase, order_id: &str) -> Order {
    let order = NewOrder::new(OrderId::from(order_id.to_string()), "S1".to_string(), Money::from(1999));
    let (order, inserted) = db.insert_order(order).await.unwrap();
    assert!(inserted);
    order
}

#[actix_web::test]
async fn accepting_an_order_notifies_the_partner() {
    let db = scratch_db().await;
    seed_order(&db, "O1").await;
    let gateway = StubGateway::default();
    let (app, _rx) = test_app!(db, gateway.clone());
    let app = test::init_service(app).await;

    let req = test::TestRequest::post()
        .uri("/api/orders/O1/accept")
        .insert_header(("X-Api-Key", TEST_API_KEY))
        .set_json(json!({"eta_minutes": 20}))
        .to_request();
    let order: Order = test::call_and_read_body_json(&app, req).await;
    assert_eq!(order.status.to_string(), "ACCEPTED");
    assert_eq!(order.eta_minutes, Some(20));
    assert_eq!(order.version, 2);
    assert_eq!(gateway.accepts.load(Ordering::SeqCst), 1);
}

#[actix_web::test]
async fn accepting_twice_is_a_noop_with_no_second_notification() {
    let db = scratch_db().await;
    seed_order(&db, "O2").await;
    let gateway = StubGateway::default();
    let (app, _rx) = test_app!(db, gateway.clone());
    let app = test::init_service(app).await;

    for _ in 0..2 {
        let req = test::TestRequest::post()
            .uri("/api/orders/O2/accept")
            .insert_header(("X-Api-Key", TEST_API_KEY))
            .set_json(json!({"eta_minutes": 20}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }
    assert_eq!(gateway.accepts.load(Ordering::SeqCst), 1);
}

#[actix_web::test]
async fn denying_a_delivered_order_conflicts() {
    let db = scratch_db().await;
    seed_order(&db, "O3").await;
    let gateway = StubGateway::default();
    let (app, _rx) = test_app!(db.clone(), gateway);
    let app = test::init_service(app).await;

    // Walk the order to Delivered through the engine
    use eats_partner_engine::lifecycle::OrderAction;
    let orders = OrderFlowApi::new(db, EventProducers::default());
    let oid = OrderId::from("O3".to_string());
    orders.apply_action(&oid, &OrderAction::Accept { eta_minutes: 10 }, None).await.unwrap();
    orders.apply_action(&oid, &OrderAction::StartPreparing, None).await.unwrap();
    orders.apply_action(&oid, &OrderAction::MarkReady, None).await.unwrap();
    orders.apply_action(&oid, &OrderAction::MarkDispatched, None).await.unwrap();
    orders.apply_action(&oid, &OrderAction::MarkDelivered, None).await.unwrap();

    let req = test::TestRequest::post()
        .uri("/api/orders/O3/deny")
        .insert_header(("X-Api-Key", TEST_API_KEY))
        .set_json(json!({"reason": "MERCHANT_REJECTED"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 409);
}

#[actix_web::test]
async fn partner_rejection_surfaces_as_bad_gateway() {
    let db = scratch_db().await;
    seed_order(&db, "O4").await;
    let (app, _rx) = test_app!(db, StubGateway::rejecting());
    let app = test::init_service(app).await;

    let req = test::TestRequest::post()
        .uri("/api/orders/O4/accept")
        .insert_header(("X-Api-Key", TEST_API_KEY))
        .set_json(json!({"eta_minutes": 15}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 502);
}

#[actix_web::test]
async fn unknown_order_is_not_found() {
    let db = scratch_db().await;
    let (app, _rx) = test_app!(db, StubGateway::default());
    let app = test::init_service(app).await;

    let req = test::TestRequest::get()
        .uri("/api/orders/O-unknown")
        .insert_header(("X-Api-Key", TEST_API_KEY))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);
}
