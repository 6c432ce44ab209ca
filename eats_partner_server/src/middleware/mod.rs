mod api_key;
mod signature;

pub use api_key::{ApiKeyMiddlewareFactory, ApiKeyMiddlewareService, ApiKeyState};
pub use signature::{SignatureMiddlewareFactory, SignatureMiddlewareService};
