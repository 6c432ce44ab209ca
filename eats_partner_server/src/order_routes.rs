//----------------------------------------------   Operator order actions  --------------------------------------------
//
// These handlers drive the same state machine the event pipeline uses; the difference is that the side-effect
// intents returned by a transition are executed synchronously here, because the operator is waiting to hear whether
// the partner took the call.

use actix_web::{web, HttpResponse};
use eats_partner_engine::{
    db_types::OrderId,
    lifecycle::{OrderAction, SideEffect},
    traits::{CourierGateway, GatewayDatabase, GatewayError, PartnerGateway},
    AppliedAction,
    EventFlowApi,
};
use log::*;

use crate::{
    data_objects::{AcceptParams, CreateDeliveryParams, DeliveryQuoteParams, ReasonParams, ResolveIssueParams},
    errors::ServerError,
    route,
};

route!(get_order => Get "/orders/{order_id}" impl GatewayDatabase, PartnerGateway where requires key);
pub async fn get_order<B, G>(
    path: web::Path<String>,
    api: web::Data<EventFlowApi<B, G>>,
) -> Result<HttpResponse, ServerError>
where
    B: GatewayDatabase,
    G: PartnerGateway,
{
    let order_id = OrderId::from(path.into_inner());
    let order = api
        .orders()
        .fetch_order(&order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_id}")))?;
    Ok(HttpResponse::Ok().json(order))
}

route!(accept_order => Post "/orders/{order_id}/accept" impl GatewayDatabase, PartnerGateway where requires key);
/// Accepts a pending order with an ETA. The partner is notified before the response returns; a partner outage
/// surfaces as 502 and the operator can simply retry the action.
pub async fn accept_order<B, G>(
    path: web::Path<String>,
    params: web::Json<AcceptParams>,
    api: web::Data<EventFlowApi<B, G>>,
    gateway: web::Data<G>,
) -> Result<HttpResponse, ServerError>
where
    B: GatewayDatabase,
    G: PartnerGateway,
{
    let order_id = OrderId::from(path.into_inner());
    let action = OrderAction::Accept { eta_minutes: params.eta_minutes };
    run_order_action(&api, gateway.get_ref(), &order_id, &action).await
}

route!(deny_order => Post "/orders/{order_id}/deny" impl GatewayDatabase, PartnerGateway where requires key);
pub async fn deny_order<B, G>(
    path: web::Path<String>,
    params: web::Json<ReasonParams>,
    api: web::Data<EventFlowApi<B, G>>,
    gateway: web::Data<G>,
) -> Result<HttpResponse, ServerError>
where
    B: GatewayDatabase,
    G: PartnerGateway,
{
    let order_id = OrderId::from(path.into_inner());
    let action = OrderAction::Deny { reason: params.reason };
    run_order_action(&api, gateway.get_ref(), &order_id, &action).await
}

route!(cancel_order => Post "/orders/{order_id}/cancel" impl GatewayDatabase, PartnerGateway where requires key);
pub async fn cancel_order<B, G>(
    path: web::Path<String>,
    params: web::Json<ReasonParams>,
    api: web::Data<EventFlowApi<B, G>>,
    gateway: web::Data<G>,
) -> Result<HttpResponse, ServerError>
where
    B: GatewayDatabase,
    G: PartnerGateway,
{
    let order_id = OrderId::from(path.into_inner());
    let action = OrderAction::Cancel { reason: params.reason };
    run_order_action(&api, gateway.get_ref(), &order_id, &action).await
}

route!(start_preparing => Post "/orders/{order_id}/start_preparing" impl GatewayDatabase, PartnerGateway where requires key);
pub async fn start_preparing<B, G>(
    path: web::Path<String>,
    api: web::Data<EventFlowApi<B, G>>,
    gateway: web::Data<G>,
) -> Result<HttpResponse, ServerError>
where
    B: GatewayDatabase,
    G: PartnerGateway,
{
    let order_id = OrderId::from(path.into_inner());
    run_order_action(&api, gateway.get_ref(), &order_id, &OrderAction::StartPreparing).await
}

route!(mark_ready => Post "/orders/{order_id}/ready" impl GatewayDatabase, PartnerGateway where requires key);
pub async fn mark_ready<B, G>(
    path: web::Path<String>,
    api: web::Data<EventFlowApi<B, G>>,
    gateway: web::Data<G>,
) -> Result<HttpResponse, ServerError>
where
    B: GatewayDatabase,
    G: PartnerGateway,
{
    let order_id = OrderId::from(path.into_inner());
    run_order_action(&api, gateway.get_ref(), &order_id, &OrderAction::MarkReady).await
}

route!(resolve_issue => Post "/orders/{order_id}/resolve_issue" impl GatewayDatabase, PartnerGateway where requires key);
/// Resolves an open fulfillment issue: either the order is unrecoverable (fails permanently) or fulfillment can
/// continue from one step back.
pub async fn resolve_issue<B, G>(
    path: web::Path<String>,
    params: web::Json<ResolveIssueParams>,
    api: web::Data<EventFlowApi<B, G>>,
    gateway: web::Data<G>,
) -> Result<HttpResponse, ServerError>
where
    B: GatewayDatabase,
    G: PartnerGateway,
{
    let order_id = OrderId::from(path.into_inner());
    let action = OrderAction::ResolveIssue { recoverable: params.recoverable };
    run_order_action(&api, gateway.get_ref(), &order_id, &action).await
}

async fn run_order_action<B, G>(
    api: &EventFlowApi<B, G>,
    gateway: &G,
    order_id: &OrderId,
    action: &OrderAction,
) -> Result<HttpResponse, ServerError>
where
    B: GatewayDatabase,
    G: PartnerGateway,
{
    let applied = api.orders().apply_action(order_id, action, None).await?;
    match applied {
        AppliedAction::Transitioned { order, side_effects } => {
            for effect in side_effects {
                execute_side_effect(gateway, order_id, effect).await?;
            }
            Ok(HttpResponse::Ok().json(order))
        },
        AppliedAction::NoOp(order) => {
            debug!("💻️ '{}' on order [{}] was a no-op", action.name(), order_id);
            Ok(HttpResponse::Ok().json(order))
        },
        AppliedAction::Stale(order) => Ok(HttpResponse::Ok().json(order)),
    }
}

async fn execute_side_effect<G: PartnerGateway>(
    gateway: &G,
    order_id: &OrderId,
    effect: SideEffect,
) -> Result<(), ServerError> {
    let result = match effect {
        SideEffect::NotifyAccept { eta_minutes } => gateway.notify_accept(order_id, eta_minutes).await,
        SideEffect::NotifyDeny { reason } => gateway.notify_deny(order_id, reason).await,
        SideEffect::NotifyReady => gateway.notify_ready(order_id).await,
        SideEffect::NotifyCancel { reason } => gateway.notify_cancel(order_id, reason).await,
    };
    result.map_err(|e| {
        warn!("💻️ Could not notify the partner about order [{order_id}]: {e}");
        match e {
            GatewayError::Transient(m) => ServerError::PartnerUnavailable(m),
            GatewayError::Rejected { status, message } => ServerError::PartnerRejected(format!("{status}: {message}")),
        }
    })
}

// -------------------------------------------  Courier passthrough  ---------------------------------------------

route!(quote_delivery => Post "/deliveries/quote" impl CourierGateway where requires key);
pub async fn quote_delivery<C>(
    params: web::Json<DeliveryQuoteParams>,
    courier: web::Data<C>,
) -> Result<HttpResponse, ServerError>
where C: CourierGateway
{
    let quote = courier
        .delivery_quote(&params.store_id, &params.dropoff_address)
        .await
        .map_err(courier_error)?;
    Ok(HttpResponse::Ok().json(quote))
}

route!(create_delivery => Post "/deliveries" impl CourierGateway where requires key);
pub async fn create_delivery<C>(
    params: web::Json<CreateDeliveryParams>,
    courier: web::Data<C>,
) -> Result<HttpResponse, ServerError>
where C: CourierGateway
{
    let order_id = OrderId::from(params.order_id.clone());
    let delivery = courier
        .create_delivery(&params.quote_id, &order_id, params.pickup_instructions.clone())
        .await
        .map_err(courier_error)?;
    Ok(HttpResponse::Ok().json(delivery))
}

fn courier_error(e: GatewayError) -> ServerError {
    match e {
        GatewayError::Transient(m) => ServerError::PartnerUnavailable(m),
        GatewayError::Rejected { status, message } => ServerError::PartnerRejected(format!("{status}: {message}")),
    }
}
