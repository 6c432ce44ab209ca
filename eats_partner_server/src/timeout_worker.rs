use chrono::Duration;
use eats_partner_engine::{db_types::Order, OrderFlowApi, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

/// Starts the acceptance-window worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Every minute, Pending orders older than the acceptance window are failed with reason ORDER_TIMEOUT. The sweep
/// re-checks each order under its lifecycle lock, so an accept that lands mid-sweep wins.
pub fn start_timeout_worker(api: OrderFlowApi<SqliteDatabase>, acceptance_window: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(60));
        info!("🕰️ Acceptance-window worker started (window {}s)", acceptance_window.num_seconds());
        loop {
            timer.tick().await;
            trace!("🕰️ Running acceptance-window sweep");
            match api.expire_timed_out_orders(acceptance_window).await {
                Ok(expired) if expired.is_empty() => {},
                Ok(expired) => {
                    info!("🕰️ {} orders timed out: {}", expired.len(), order_list(&expired));
                },
                Err(e) => {
                    error!("🕰️ Error running acceptance-window sweep: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] order_id: {} store: {}", o.id, o.order_id, o.store_id))
        .collect::<Vec<String>>()
        .join(", ")
}
