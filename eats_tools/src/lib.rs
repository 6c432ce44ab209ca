mod api;
mod config;
mod error;

mod data_objects;

pub use api::EatsApi;
pub use config::EatsConfig;
pub use data_objects::{
    AcceptOrderRequest,
    CancelOrderRequest,
    CreateDeliveryRequest,
    Delivery,
    DeliveryQuote,
    DeliveryQuoteRequest,
    DenyOrderRequest,
    IntrospectionResponse,
    MarkReadyRequest,
    TokenResponse,
};
pub use error::EatsApiError;
