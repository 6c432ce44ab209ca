use std::{fmt::Debug, sync::Arc};

use chrono::Duration;
use log::*;

use crate::{
    api::{errors::OrderFlowError, KeyedLock},
    db_types::{NewOrder, Order, OrderId},
    events::{EventProducers, OrderStateChanged},
    lifecycle::{self, OrderAction, SideEffect},
    traits::{OrderManagement, OrderUpdate},
};

/// `OrderFlowApi` is the only path to order state. Every transition goes through the lifecycle state machine, under
/// a per-order async lock, so that two events for the same order processed by different workers can never interleave
/// their read-check-write cycles.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
    locks: Arc<KeyedLock<OrderId>>,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B: Clone> Clone for OrderFlowApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone(), locks: Arc::clone(&self.locks) }
    }
}

/// Outcome of feeding an action (or an event carrying one) through the state machine.
#[derive(Debug, Clone)]
pub enum AppliedAction {
    /// The transition was committed. The side effects still need to be executed by the caller.
    Transitioned { order: Order, side_effects: Vec<SideEffect> },
    /// The order was already in the target state. Nothing was written.
    NoOp(Order),
    /// The event carried a snapshot older than the stored order and was discarded.
    Stale(Order),
}

impl AppliedAction {
    pub fn order(&self) -> &Order {
        match self {
            Self::Transitioned { order, .. } | Self::NoOp(order) | Self::Stale(order) => order,
        }
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, locks: Arc::new(KeyedLock::new()) }
    }
}

impl<B> OrderFlowApi<B>
where B: OrderManagement
{
    /// Registers a newly notified order with `Pending` status. Idempotent: a duplicate notification returns the
    /// existing record and `false`.
    pub async fn process_new_order(&self, order: NewOrder) -> Result<(Order, bool), OrderFlowError> {
        let _guard = self.locks.acquire(&order.order_id).await;
        let (order, inserted) = self.db.insert_order(order).await?;
        if inserted {
            debug!("🔄️📦️ Order [{}] registered for store {}", order.order_id, order.store_id);
        } else {
            debug!("🔄️📦️ Order [{}] was already registered. Ignoring duplicate notification.", order.order_id);
        }
        Ok((order, inserted))
    }

    /// Runs `action` through the state machine and commits the result.
    ///
    /// `event_version` is the order version embedded in an inbound event, if any; events older than the stored
    /// version are discarded as stale rather than applied out of order. The returned side effects have *not* been
    /// executed; the caller routes them through the outbound gateway.
    pub async fn apply_action(
        &self,
        order_id: &OrderId,
        action: &OrderAction,
        event_version: Option<i64>,
    ) -> Result<AppliedAction, OrderFlowError> {
        let _guard = self.locks.acquire(order_id).await;
        let order = self
            .db
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_id.clone()))?;
        if lifecycle::is_stale(&order, event_version) {
            info!(
                "🔄️📦️ Discarding stale '{}' for order [{}]: event version {:?} is behind stored version {}",
                action.name(),
                order_id,
                event_version,
                order.version
            );
            return Ok(AppliedAction::Stale(order));
        }
        let transition = lifecycle::apply(&order, action)?;
        if !transition.changed {
            debug!("🔄️📦️ '{}' on order [{}] is a no-op. Already {}.", action.name(), order_id, order.status);
            return Ok(AppliedAction::NoOp(order));
        }
        let old_status = order.status;
        let update = OrderUpdate {
            status: transition.new_status,
            eta_minutes: transition.eta_minutes,
            cancellation_reason: transition.cancellation_reason,
        };
        let updated = self.db.update_order_status(order_id, update, order.version).await?;
        info!(
            "🔄️📦️ Order [{}] {} -> {} via '{}' (version {})",
            order_id,
            old_status,
            updated.status,
            action.name(),
            updated.version
        );
        self.call_state_changed_hook(&updated, old_status).await;
        Ok(AppliedAction::Transitioned { order: updated, side_effects: transition.side_effects })
    }

    /// Fails every `Pending` order whose acceptance window has elapsed. Returns the orders that were timed out.
    pub async fn expire_timed_out_orders(&self, window: Duration) -> Result<Vec<Order>, OrderFlowError> {
        let candidates = self.db.fetch_timed_out_orders(window).await?;
        let mut expired = Vec::with_capacity(candidates.len());
        for order in candidates {
            // Re-checked under the order lock; an accept may have landed since the sweep query.
            match self.apply_action(&order.order_id, &OrderAction::Timeout, None).await {
                Ok(AppliedAction::Transitioned { order, .. }) => expired.push(order),
                Ok(_) => {},
                Err(OrderFlowError::IllegalTransition(_)) => {
                    trace!("🔄️📦️ Order [{}] left Pending before the timeout sweep reached it", order.order_id);
                },
                Err(e) => return Err(e),
            }
        }
        Ok(expired)
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderFlowError> {
        Ok(self.db.fetch_order_by_order_id(order_id).await?)
    }

    async fn call_state_changed_hook(&self, order: &Order, old_status: crate::db_types::OrderStatusType) {
        for emitter in &self.producers.order_state_changed_producer {
            trace!("🔄️📦️ Notifying order state change subscribers");
            let event = OrderStateChanged::new(order.clone(), old_status);
            emitter.publish_event(event).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
