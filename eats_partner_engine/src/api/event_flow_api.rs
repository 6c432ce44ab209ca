use std::{fmt::Debug, str::FromStr};

use chrono::{DateTime, Utc};
use epg_common::Money;
use log::*;
use serde::de::DeserializeOwned;

use crate::{
    api::{errors::EventFlowError, AppliedAction, OrderFlowApi},
    db_types::{EventId, EventStatus, NewOrder, NewWebhookEvent, OrderId, WebhookEvent, WebhookEventType},
    eats_types::{
        FulfillmentIssueData,
        OrderCancelData,
        OrderNotificationData,
        OrderStatusUpdateData,
        StoreEventData,
        WebhookEnvelope,
    },
    events::{EventProcessingFailed, EventProducers},
    helpers::{retry_delay, MAX_RETRY_ATTEMPTS},
    lifecycle::{OrderAction, SideEffect},
    traits::{
        EventManagement,
        EventQueryFilter,
        GatewayError,
        InsertEventResult,
        OrderManagement,
        PartnerGateway,
    },
};

/// What the dispatcher should do with an event after a processing run.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// Terminal success. Also returned for duplicate runs against an already-processed event.
    Processed,
    /// Transient failure; run again at the given time.
    Retry { at: DateTime<Utc> },
    /// Terminal failure. The event stays visible for audit and manual retry.
    Failed,
    /// The event was in a state that does not want processing (e.g. failed and not re-armed).
    Skipped,
}

/// `EventFlowApi` owns the asynchronous half of the ingestion pipeline: everything after the webhook endpoint has
/// acknowledged receipt. It maps stored events onto state machine actions, executes the resulting side effects
/// through the outbound gateway, and keeps the event record's status/attempt bookkeeping.
pub struct EventFlowApi<B, G> {
    db: B,
    orders: OrderFlowApi<B>,
    gateway: G,
    producers: EventProducers,
}

impl<B, G> Debug for EventFlowApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EventFlowApi")
    }
}

impl<B: Clone, G: Clone> Clone for EventFlowApi<B, G> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            orders: self.orders.clone(),
            gateway: self.gateway.clone(),
            producers: self.producers.clone(),
        }
    }
}

impl<B: Clone, G> EventFlowApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers) -> Self {
        let orders = OrderFlowApi::new(db.clone(), producers.clone());
        Self { db, orders, gateway, producers }
    }

    pub fn orders(&self) -> &OrderFlowApi<B> {
        &self.orders
    }
}

impl<B, G> EventFlowApi<B, G>
where
    B: EventManagement + OrderManagement,
    G: PartnerGateway,
{
    /// Steps 2–3 of the ingestion pipeline: parse the envelope and store the event idempotently. The caller has
    /// already verified the signature; acknowledgment happens on the result of this call, before any processing.
    pub async fn ingest(&self, raw_body: &str) -> Result<InsertEventResult, EventFlowError> {
        let envelope: WebhookEnvelope = serde_json::from_str(raw_body)
            .map_err(|e| EventFlowError::MalformedPayload(format!("Invalid webhook envelope: {e}")))?;
        if envelope.metadata.event_id.is_empty() {
            return Err(EventFlowError::MalformedPayload("Envelope metadata is missing an event_id".to_string()));
        }
        let mut event = NewWebhookEvent::new(
            EventId::from(envelope.metadata.event_id.clone()),
            envelope.metadata.event_type.clone(),
            raw_body.to_string(),
        );
        if let Some(order_id) = envelope.order_id() {
            event = event.with_order_id(OrderId::from(order_id));
        }
        let result = self.db.insert_event(event).await?;
        Ok(result)
    }

    /// One processing run for a stored event. All status bookkeeping is persisted before this returns; the outcome
    /// only tells the dispatcher whether to reschedule.
    pub async fn process_event(&self, id: i64) -> ProcessOutcome {
        let event = match self.db.fetch_event(id).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                warn!("📨️ Asked to process event #{id}, but it does not exist");
                return ProcessOutcome::Skipped;
            },
            Err(e) => {
                // The store being unreachable is the canonical transient failure. Try again on the base delay.
                error!("📨️ Could not load event #{id}: {e}");
                return ProcessOutcome::Retry { at: Utc::now() + retry_delay(1) };
            },
        };
        match event.status {
            EventStatus::Processed => {
                debug!("📨️ Event [{}] is already processed. Nothing to do.", event.event_id);
                return ProcessOutcome::Processed;
            },
            EventStatus::Failed => {
                debug!("📨️ Event [{}] is failed and has not been re-armed. Skipping.", event.event_id);
                return ProcessOutcome::Skipped;
            },
            EventStatus::Pending | EventStatus::Retrying | EventStatus::Processing => {},
        }
        let event = match self.db.mark_event_processing(id).await {
            Ok(event) => event,
            Err(e) => {
                error!("📨️ Could not mark event #{id} as processing: {e}");
                return ProcessOutcome::Retry { at: Utc::now() + retry_delay(1) };
            },
        };
        trace!("📨️ Processing event [{}] ({}), attempt {}", event.event_id, event.event_type, event.attempts);
        match self.handle_event(&event).await {
            Ok(note) => {
                if let Err(e) = self.db.mark_event_processed(id, note).await {
                    error!("📨️ Event [{}] was handled but could not be marked processed: {e}", event.event_id);
                    return ProcessOutcome::Retry { at: Utc::now() + retry_delay(event.attempts) };
                }
                debug!("📨️ Event [{}] processed after {} attempt(s)", event.event_id, event.attempts);
                ProcessOutcome::Processed
            },
            Err(e) if e.is_transient() && event.attempts < MAX_RETRY_ATTEMPTS => {
                let at = Utc::now() + retry_delay(event.attempts);
                warn!(
                    "📨️ Event [{}] attempt {}/{MAX_RETRY_ATTEMPTS} failed: {e}. Retrying at {at}",
                    event.event_id, event.attempts
                );
                if let Err(e) = self.db.mark_event_retrying(id, at, &e.to_string()).await {
                    error!("📨️ Could not record retry state for event [{}]: {e}", event.event_id);
                }
                ProcessOutcome::Retry { at }
            },
            Err(e) => {
                let reason = if e.is_transient() {
                    format!("Retries exhausted after {} attempts. Last error: {e}", event.attempts)
                } else {
                    e.to_string()
                };
                error!("📨️ Event [{}] failed permanently: {reason}", event.event_id);
                let failed = self.db.mark_event_failed(id, &reason).await;
                match failed {
                    Ok(event) => self.call_event_failed_hook(event, reason).await,
                    Err(e) => error!("📨️ Could not mark event #{id} as failed: {e}"),
                }
                ProcessOutcome::Failed
            },
        }
    }

    /// Step 6 of the pipeline: re-arms a failed or retrying event. The attempt counter is only reset when the
    /// operator explicitly asks for it.
    pub async fn manual_retry(&self, id: i64, reset_attempts: bool) -> Result<WebhookEvent, EventFlowError> {
        let event = self.db.fetch_event(id).await?.ok_or(EventFlowError::EventNotFound(id))?;
        if !matches!(event.status, EventStatus::Failed | EventStatus::Retrying) {
            return Err(EventFlowError::InvalidRetryState(id, event.status.to_string()));
        }
        let event = self.db.reset_event_for_retry(id, reset_attempts).await?;
        info!(
            "📨️ Event [{}] re-armed for retry by operator (attempts {})",
            event.event_id, event.attempts
        );
        Ok(event)
    }

    /// Drops a scheduled retry. The event is marked failed so it stays actionable through the retry interface.
    pub async fn cancel_retry(&self, id: i64) -> Result<WebhookEvent, EventFlowError> {
        let event = self.db.fetch_event(id).await?.ok_or(EventFlowError::EventNotFound(id))?;
        if event.status != EventStatus::Retrying {
            return Err(EventFlowError::InvalidRetryState(id, event.status.to_string()));
        }
        let event = self.db.mark_event_failed(id, "Retry cancelled by operator").await?;
        info!("📨️ Scheduled retry for event [{}] cancelled by operator", event.event_id);
        Ok(event)
    }

    /// Events to put back on the dispatch queue after a restart.
    pub async fn recover_incomplete_events(&self) -> Result<Vec<WebhookEvent>, EventFlowError> {
        Ok(self.db.fetch_incomplete_events().await?)
    }

    pub async fn fetch_event(&self, id: i64) -> Result<Option<WebhookEvent>, EventFlowError> {
        Ok(self.db.fetch_event(id).await?)
    }

    pub async fn search_events(&self, query: EventQueryFilter) -> Result<Vec<WebhookEvent>, EventFlowError> {
        Ok(self.db.search_events(query).await?)
    }

    pub async fn events_for_order(&self, order_id: &OrderId) -> Result<Vec<WebhookEvent>, EventFlowError> {
        Ok(self.db.fetch_events_for_order(order_id).await?)
    }

    /// Maps the stored event onto the matching handler. Returns an optional note recorded on the processed event.
    async fn handle_event(&self, event: &WebhookEvent) -> Result<Option<String>, EventFlowError> {
        let envelope: WebhookEnvelope = serde_json::from_str(&event.payload)
            .map_err(|e| EventFlowError::MalformedPayload(format!("Invalid webhook envelope: {e}")))?;
        let event_type = WebhookEventType::from_str(&event.event_type)
            .map_err(|_| EventFlowError::UnknownEventType(event.event_type.clone()))?;
        match event_type {
            WebhookEventType::OrderNotification | WebhookEventType::ScheduledOrderNotification => {
                let data: OrderNotificationData = parse_data(envelope)?;
                self.handle_order_notification(data).await
            },
            WebhookEventType::OrderCancel => {
                let data: OrderCancelData = parse_data(envelope)?;
                let action = OrderAction::Cancel { reason: data.cancel_reason };
                self.apply_order_action(&OrderId::from(data.order_id), &action, None).await
            },
            WebhookEventType::OrderStatusUpdate => {
                let data: OrderStatusUpdateData = parse_data(envelope)?;
                let action = status_update_action(&data)?;
                self.apply_order_action(&OrderId::from(data.order_id), &action, data.order_version).await
            },
            WebhookEventType::FulfillmentIssue => {
                let data: FulfillmentIssueData = parse_data(envelope)?;
                warn!(
                    "📨️ Fulfillment issue '{}' reported for order [{}]: {}",
                    data.issue_type,
                    data.order_id,
                    data.description.as_deref().unwrap_or("no description")
                );
                Ok(Some(format!("Fulfillment issue recorded: {}", data.issue_type)))
            },
            WebhookEventType::StoreStatus
            | WebhookEventType::StoreProvisioned
            | WebhookEventType::StoreDeprovisioned => {
                let data: StoreEventData = parse_data(envelope)?;
                info!(
                    "📨️ Store event {} for store {} (status: {})",
                    event_type,
                    data.store_id,
                    data.status.as_deref().unwrap_or("n/a")
                );
                Ok(Some("Store event recorded".to_string()))
            },
        }
    }

    async fn handle_order_notification(&self, data: OrderNotificationData) -> Result<Option<String>, EventFlowError> {
        let total = data.total.map(Money::from_major).unwrap_or_default();
        let mut order = NewOrder::new(OrderId::from(data.order_id), data.store_id, total);
        if let Some(placed_at) = data.placed_at {
            order.placed_at = placed_at;
        }
        let (order, inserted) = self.orders.process_new_order(order).await?;
        let note = if inserted { None } else { Some(format!("Order {} already registered", order.order_id)) };
        Ok(note)
    }

    async fn apply_order_action(
        &self,
        order_id: &OrderId,
        action: &OrderAction,
        event_version: Option<i64>,
    ) -> Result<Option<String>, EventFlowError> {
        let applied = self.orders.apply_action(order_id, action, event_version).await?;
        match applied {
            AppliedAction::Transitioned { order, side_effects } => {
                for effect in side_effects {
                    self.run_side_effect(&order.order_id, effect).await?;
                }
                Ok(None)
            },
            AppliedAction::NoOp(order) => Ok(Some(format!("Order {} already {}", order.order_id, order.status))),
            AppliedAction::Stale(order) => {
                Ok(Some(format!("Discarded stale event. Order {} is at version {}", order.order_id, order.version)))
            },
        }
    }

    /// Executes a side-effect intent through the outbound gateway. Inbound transitions acknowledge the change back
    /// to the partner; transient failures bubble up as retryable.
    async fn run_side_effect(&self, order_id: &OrderId, effect: SideEffect) -> Result<(), EventFlowError> {
        let result = match effect {
            SideEffect::NotifyAccept { eta_minutes } => self.gateway.notify_accept(order_id, eta_minutes).await,
            SideEffect::NotifyDeny { reason } => self.gateway.notify_deny(order_id, reason).await,
            SideEffect::NotifyReady => self.gateway.notify_ready(order_id).await,
            SideEffect::NotifyCancel { reason } => self.gateway.notify_cancel(order_id, reason).await,
        };
        result.map_err(|e| match e {
            GatewayError::Transient(msg) => EventFlowError::Transient(msg),
            GatewayError::Rejected { status, message } => {
                EventFlowError::GatewayRejected(format!("{status}: {message}"))
            },
        })
    }

    async fn call_event_failed_hook(&self, event: WebhookEvent, reason: String) {
        for emitter in &self.producers.event_failed_producer {
            trace!("📨️ Notifying event failure subscribers");
            let failure = EventProcessingFailed::new(event.clone(), reason.clone());
            emitter.publish_event(failure).await;
        }
    }
}

fn parse_data<T: DeserializeOwned>(envelope: WebhookEnvelope) -> Result<T, EventFlowError> {
    serde_json::from_value(envelope.data)
        .map_err(|e| EventFlowError::MalformedPayload(format!("Invalid event data block: {e}")))
}

/// Maps a partner status report to the action that drives the same transition. The state machine, not the snapshot,
/// decides legality.
fn status_update_action(data: &OrderStatusUpdateData) -> Result<OrderAction, EventFlowError> {
    use crate::db_types::OrderStatusType::*;
    match data.new_status {
        Preparing => Ok(OrderAction::StartPreparing),
        ReadyForPickup => Ok(OrderAction::MarkReady),
        Dispatched => Ok(OrderAction::MarkDispatched),
        Delivered => Ok(OrderAction::MarkDelivered),
        Cancelled => Ok(OrderAction::Cancel { reason: crate::db_types::CancelReason::Other }),
        other => Err(EventFlowError::MalformedPayload(format!(
            "Status updates cannot move an order to {other}; that transition has its own operation"
        ))),
    }
}
