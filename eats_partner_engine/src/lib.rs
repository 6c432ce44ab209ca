//! Eats Partner Gateway engine
//!
//! The engine holds the core logic of the gateway: the durable, deduplicated webhook event store; the order
//! lifecycle state machine; the asynchronous dispatch/retry pipeline; and the OAuth token lifecycle manager that
//! guards every outbound call to the partner platform.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@traits`], [`SqliteDatabase`]). SQLite is the supported backend. You
//!    should never need to access the database directly; use the public API instead. The exception is the data
//!    types used in the database, which are defined in the `db_types` module and are public.
//! 2. The engine public API ([`EventFlowApi`], [`OrderFlowApi`], [`TokenApi`]). Specific backends need to implement
//!    the storage traits in [`mod@traits`] to back these APIs; the outbound traits in the same module are the seam
//!    to the partner platform's HTTP client.
//! 3. The dispatch pipeline ([`mod@dispatch`]), which runs stored events through their handlers on a bounded worker
//!    pool with scheduled retries.
//!
//! The engine also emits hook events (order state changes, permanent event failures) through a small actor-style
//! pub-sub system in [`mod@events`].
mod api;
pub mod db_types;
pub mod dispatch;
pub mod eats_types;
pub mod events;
pub mod helpers;
pub mod lifecycle;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use api::{
    canonical_scopes,
    errors::{EventFlowError, OrderFlowError, TokenError},
    AppliedAction,
    EventFlowApi,
    KeyedLock,
    OrderFlowApi,
    ProcessOutcome,
    TokenApi,
    TokenIntrospection,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
