pub mod backoff;
pub mod signature;

pub use backoff::{retry_delay, MAX_RETRY_ATTEMPTS};
pub use signature::{calculate_signature, verify_signature};
