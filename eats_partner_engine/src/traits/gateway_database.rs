use crate::traits::{EventManagement, OrderManagement, TokenStore};

/// Umbrella trait for a backend that can support the whole gateway: the event store, order records and the
/// credential store, over a durable medium with atomic conditional inserts.
#[allow(async_fn_in_trait)]
pub trait GatewayDatabase: Clone + EventManagement + OrderManagement + TokenStore {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), sqlx::Error> {
        Ok(())
    }
}
