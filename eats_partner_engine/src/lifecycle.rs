//! The order lifecycle state machine.
//!
//! [`apply`] is the only place where order status transitions are decided. It is a pure function: it never touches
//! the database or the partner platform. Anything that must happen *because* of a transition (telling the partner
//! about an acceptance, for example) is returned as a [`SideEffect`] intent for the caller to execute.
//!
//! The legal transitions are:
//!
//! | From            | To                                       | Trigger                                    |
//! |-----------------|------------------------------------------|--------------------------------------------|
//! | Pending         | Accepted / Denied / Cancelled / Failed   | accept / deny / cancel / acceptance timeout|
//! | Accepted        | Preparing                                | start preparing                            |
//! | Preparing       | ReadyForPickup                           | mark ready                                 |
//! | ReadyForPickup  | Dispatched                               | courier pickup                             |
//! | Dispatched      | Delivered                                | delivery confirmation                      |
//! | any non-terminal| Cancelled                                | cancel, with reason                        |
//! | Ready/Dispatched| Failed, or one step back                 | fulfillment issue resolution               |
//!
//! Re-applying an action whose target equals the current status is a no-op success, which makes event handling safe
//! under at-least-once delivery.

use thiserror::Error;

use crate::db_types::{CancelReason, Order, OrderStatusType};

#[derive(Debug, Clone, PartialEq)]
pub enum OrderAction {
    /// Accept the order with an estimated preparation time in minutes.
    Accept { eta_minutes: i64 },
    /// Decline the order.
    Deny { reason: CancelReason },
    /// Cancel the order. Legal from any non-terminal state.
    Cancel { reason: CancelReason },
    /// The kitchen has started on the order.
    StartPreparing,
    /// The order is ready for courier pickup.
    MarkReady,
    /// A courier has collected the order.
    MarkDispatched,
    /// The order reached the customer.
    MarkDelivered,
    /// Resolve an open fulfillment issue. An unrecoverable issue fails the order; a recoverable one steps the order
    /// back to the previous non-terminal state so fulfillment can continue. The version counter still advances.
    ResolveIssue { recoverable: bool },
    /// The acceptance window elapsed without an accept/deny decision.
    Timeout,
}

impl OrderAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Accept { .. } => "accept",
            Self::Deny { .. } => "deny",
            Self::Cancel { .. } => "cancel",
            Self::StartPreparing => "start_preparing",
            Self::MarkReady => "mark_ready",
            Self::MarkDispatched => "mark_dispatched",
            Self::MarkDelivered => "mark_delivered",
            Self::ResolveIssue { .. } => "resolve_issue",
            Self::Timeout => "timeout",
        }
    }
}

/// An outbound call the caller must make on behalf of a transition. Executing these is the Outbound Gateway's job;
/// keeping them out of [`apply`] keeps the transition logic synchronous and unit-testable.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    NotifyAccept { eta_minutes: i64 },
    NotifyDeny { reason: CancelReason },
    NotifyCancel { reason: CancelReason },
    NotifyReady,
}

/// The outcome of a legal [`apply`] call.
#[derive(Debug, Clone)]
pub struct Transition {
    pub new_status: OrderStatusType,
    pub eta_minutes: Option<i64>,
    pub cancellation_reason: Option<CancelReason>,
    pub side_effects: Vec<SideEffect>,
    /// False when the order was already in the target state and nothing needs to be written.
    pub changed: bool,
}

impl Transition {
    fn to(new_status: OrderStatusType) -> Self {
        Self { new_status, eta_minutes: None, cancellation_reason: None, side_effects: Vec::new(), changed: true }
    }

    fn noop(status: OrderStatusType) -> Self {
        Self { new_status: status, eta_minutes: None, cancellation_reason: None, side_effects: Vec::new(), changed: false }
    }

    fn with_eta(mut self, eta_minutes: i64) -> Self {
        self.eta_minutes = Some(eta_minutes);
        self
    }

    fn with_reason(mut self, reason: CancelReason) -> Self {
        self.cancellation_reason = Some(reason);
        self
    }

    fn with_effect(mut self, effect: SideEffect) -> Self {
        self.side_effects.push(effect);
        self
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LifecycleError {
    #[error("Action '{action}' is not legal for an order in state {from}")]
    IllegalTransition { from: OrderStatusType, action: &'static str },
}

/// Computes the transition for `action` against the order's current status.
///
/// Returns `IllegalTransition` when the target is not reachable from the current state. Events that trip this are
/// marked failed and never retried; a structurally illegal transition will not become legal on retry.
pub fn apply(order: &Order, action: &OrderAction) -> Result<Transition, LifecycleError> {
    use OrderStatusType::*;
    let status = order.status;
    let illegal = || Err(LifecycleError::IllegalTransition { from: status, action: action.name() });
    match action {
        OrderAction::Accept { eta_minutes } => match status {
            Pending => Ok(Transition::to(Accepted)
                .with_eta(*eta_minutes)
                .with_effect(SideEffect::NotifyAccept { eta_minutes: *eta_minutes })),
            Accepted => Ok(Transition::noop(status)),
            _ => illegal(),
        },
        OrderAction::Deny { reason } => match status {
            Pending => {
                Ok(Transition::to(Denied).with_reason(*reason).with_effect(SideEffect::NotifyDeny { reason: *reason }))
            },
            Denied => Ok(Transition::noop(status)),
            _ => illegal(),
        },
        OrderAction::Cancel { reason } => match status {
            Cancelled => Ok(Transition::noop(status)),
            s if s.is_terminal() => illegal(),
            _ => Ok(Transition::to(Cancelled)
                .with_reason(*reason)
                .with_effect(SideEffect::NotifyCancel { reason: *reason })),
        },
        OrderAction::StartPreparing => match status {
            Accepted => Ok(Transition::to(Preparing)),
            Preparing => Ok(Transition::noop(status)),
            _ => illegal(),
        },
        OrderAction::MarkReady => match status {
            Preparing => Ok(Transition::to(ReadyForPickup).with_effect(SideEffect::NotifyReady)),
            ReadyForPickup => Ok(Transition::noop(status)),
            _ => illegal(),
        },
        OrderAction::MarkDispatched => match status {
            ReadyForPickup => Ok(Transition::to(Dispatched)),
            Dispatched => Ok(Transition::noop(status)),
            _ => illegal(),
        },
        OrderAction::MarkDelivered => match status {
            Dispatched => Ok(Transition::to(Delivered)),
            Delivered => Ok(Transition::noop(status)),
            _ => illegal(),
        },
        OrderAction::ResolveIssue { recoverable } => match (status, recoverable) {
            (ReadyForPickup | Dispatched, false) => {
                Ok(Transition::to(Failed).with_reason(CancelReason::DeliveryIssue))
            },
            // The only non-forward edge in the graph: a recovered issue steps the order back one state so the
            // fulfillment flow can re-run from there.
            (ReadyForPickup, true) => Ok(Transition::to(Preparing)),
            (Dispatched, true) => Ok(Transition::to(ReadyForPickup)),
            _ => illegal(),
        },
        OrderAction::Timeout => match status {
            Pending => Ok(Transition::to(Failed).with_reason(CancelReason::OrderTimeout)),
            Failed => Ok(Transition::noop(status)),
            _ => illegal(),
        },
    }
}

/// True when an event snapshot version is behind the stored order and must be discarded rather than applied.
pub fn is_stale(order: &Order, event_version: Option<i64>) -> bool {
    matches!(event_version, Some(v) if v < order.version)
}
