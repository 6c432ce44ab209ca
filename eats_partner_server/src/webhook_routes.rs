//----------------------------------------------   Webhook intake  ----------------------------------------------------

use actix_web::{web, HttpRequest, HttpResponse};
use eats_partner_engine::{
    dispatch::DispatchHandle,
    traits::{GatewayDatabase, InsertEventResult, PartnerGateway},
    EventFlowApi,
    EventFlowError,
};
use log::{debug, trace, warn};

use crate::{data_objects::WebhookAck, errors::ServerError, helpers::get_remote_ip, route, server::ProxyOptions};

// Mounted under the `/webhook` scope, wrapped by the signature middleware
route!(incoming_webhook => Post "" impl GatewayDatabase, PartnerGateway);
/// The webhook intake endpoint. The signature middleware has already authenticated the request by the time this
/// handler runs; all that is left is to parse the envelope, store the event idempotently, and acknowledge. The
/// acknowledgment never waits on processing: the partner platform enforces short response deadlines and will mark
/// the endpoint unhealthy otherwise.
pub async fn incoming_webhook<B, G>(
    req: HttpRequest,
    body: web::Bytes,
    api: web::Data<EventFlowApi<B, G>>,
    dispatch: web::Data<DispatchHandle>,
    proxy: web::Data<ProxyOptions>,
) -> Result<HttpResponse, ServerError>
where
    B: GatewayDatabase,
    G: PartnerGateway,
{
    let peer = get_remote_ip(&req, proxy.use_x_forwarded_for, proxy.use_forwarded);
    trace!("🌐️ Webhook delivery from {peer:?}");
    let raw = std::str::from_utf8(&body)
        .map_err(|e| ServerError::InvalidRequestBody(format!("Body is not valid UTF-8: {e}")))?;
    let result = match api.ingest(raw).await {
        Ok(result) => result,
        Err(EventFlowError::MalformedPayload(m)) => {
            warn!("🌐️ Rejected malformed webhook delivery: {m}");
            return Err(ServerError::InvalidRequestBody(m));
        },
        Err(e) => return Err(e.into()),
    };
    match &result {
        InsertEventResult::Inserted(event) => {
            debug!("🌐️ Event [{}] ({}) stored. Queueing for dispatch.", event.event_id, event.event_type);
            dispatch.submit(event.id).await;
        },
        InsertEventResult::Duplicate(event) => {
            debug!("🌐️ Duplicate delivery of event [{}] acknowledged without reprocessing", event.event_id);
        },
    }
    let event = result.event();
    Ok(HttpResponse::Ok().json(WebhookAck { received: true, event_id: event.event_id.clone() }))
}
