mod support;

use chrono::{Duration, Utc};
use eats_partner_engine::{
    db_types::{CancelReason, NewOrder, OrderStatusType},
    events::EventProducers,
    lifecycle::OrderAction,
    OrderFlowApi,
    SqliteDatabase,
};
use epg_common::Money;
use support::{prepare_test_env, random_db_path};

async fn new_api(url: &str) -> OrderFlowApi<SqliteDatabase> {
    prepare_test_env(url).await;
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating database");
    OrderFlowApi::new(db, EventProducers::default())
}

fn aged_order(order_id: &str, age: Duration) -> NewOrder {
    let mut order = NewOrder::new(order_id.parse().unwrap(), "S1".to_string(), Money::from(1500));
    order.placed_at = Utc::now() - age;
    order
}

#[tokio::test]
async fn pending_orders_past_the_window_fail_with_order_timeout() {
    let url = random_db_path();
    let api = new_api(&url).await;
    let window = Duration::minutes(11);

    api.process_new_order(aged_order("O-old", Duration::minutes(20))).await.unwrap();
    api.process_new_order(aged_order("O-fresh", Duration::minutes(2))).await.unwrap();

    let expired = api.expire_timed_out_orders(window).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].order_id.as_str(), "O-old");

    let order = api.fetch_order(&"O-old".parse().unwrap()).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Failed);
    assert_eq!(order.cancellation_reason, Some(CancelReason::OrderTimeout));
    assert_eq!(order.version, 2);

    let order = api.fetch_order(&"O-fresh".parse().unwrap()).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);
}

#[tokio::test]
async fn accepted_orders_are_not_swept() {
    let url = random_db_path();
    let api = new_api(&url).await;

    api.process_new_order(aged_order("O-accepted", Duration::minutes(30))).await.unwrap();
    api.apply_action(&"O-accepted".parse().unwrap(), &OrderAction::Accept { eta_minutes: 25 }, None).await.unwrap();

    let expired = api.expire_timed_out_orders(Duration::minutes(11)).await.unwrap();
    assert!(expired.is_empty());
    let order = api.fetch_order(&"O-accepted".parse().unwrap()).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Accepted);
}

#[tokio::test]
async fn sweep_is_idempotent() {
    let url = random_db_path();
    let api = new_api(&url).await;

    api.process_new_order(aged_order("O-old", Duration::hours(1))).await.unwrap();
    let first = api.expire_timed_out_orders(Duration::minutes(11)).await.unwrap();
    assert_eq!(first.len(), 1);
    let second = api.expire_timed_out_orders(Duration::minutes(11)).await.unwrap();
    assert!(second.is_empty());
}
