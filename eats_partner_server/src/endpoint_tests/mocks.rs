use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use chrono::Utc;
use eats_partner_engine::{
    db_types::{CancelReason, OrderId},
    traits::{
        CourierDelivery,
        CourierGateway,
        CourierQuote,
        GatewayError,
        PartnerGateway,
        TokenExchange,
        TokenGrant,
    },
};
use epg_common::Money;

/// Records partner notifications; optionally rejects everything with a canned error.
#[derive(Clone, Default)]
pub struct StubGateway {
    pub accepts: Arc<AtomicUsize>,
    pub denies: Arc<AtomicUsize>,
    pub readies: Arc<AtomicUsize>,
    pub cancels: Arc<AtomicUsize>,
    pub reject_all: bool,
}

impl StubGateway {
    pub fn rejecting() -> Self {
        Self { reject_all: true, ..Default::default() }
    }

    fn record(&self, counter: &AtomicUsize) -> Result<(), GatewayError> {
        if self.reject_all {
            return Err(GatewayError::Rejected { status: 409, message: "order state desync".to_string() });
        }
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl PartnerGateway for StubGateway {
    async fn notify_accept(&self, _order_id: &OrderId, _eta_minutes: i64) -> Result<(), GatewayError> {
        self.record(&self.accepts)
    }

    async fn notify_deny(&self, _order_id: &OrderId, _reason: CancelReason) -> Result<(), GatewayError> {
        self.record(&self.denies)
    }

    async fn notify_ready(&self, _order_id: &OrderId) -> Result<(), GatewayError> {
        self.record(&self.readies)
    }

    async fn notify_cancel(&self, _order_id: &OrderId, _reason: CancelReason) -> Result<(), GatewayError> {
        self.record(&self.cancels)
    }
}

impl CourierGateway for StubGateway {
    async fn delivery_quote(&self, _store_id: &str, _dropoff_address: &str) -> Result<CourierQuote, GatewayError> {
        Ok(CourierQuote { quote_id: "q-1".to_string(), fee: Money::from(499), expires_at: Utc::now() })
    }

    async fn create_delivery(
        &self,
        quote_id: &str,
        order_id: &OrderId,
        _pickup_instructions: Option<String>,
    ) -> Result<CourierDelivery, GatewayError> {
        Ok(CourierDelivery {
            delivery_id: format!("d-{quote_id}"),
            order_id: order_id.clone(),
            status: "SCHEDULED".to_string(),
            courier_name: None,
            tracking_url: None,
        })
    }
}

#[derive(Clone, Default)]
pub struct StubExchange {
    pub exchanges: Arc<AtomicUsize>,
}

impl TokenExchange for StubExchange {
    async fn exchange(&self, subject: &str, scopes: &str) -> Result<TokenGrant, GatewayError> {
        let n = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TokenGrant {
            access_token: format!("at-{subject}-{n}"),
            refresh_token: None,
            expires_in: 3600,
            scope: scopes.to_string(),
        })
    }

    async fn refresh(&self, _subject: &str, _refresh_token: &str) -> Result<TokenGrant, GatewayError> {
        Err(GatewayError::Rejected { status: 400, message: "invalid_grant".to_string() })
    }

    async fn revoke(&self, _access_token: &str) -> Result<(), GatewayError> {
        Ok(())
    }
}
