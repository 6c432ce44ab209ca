//! # Eats Partner Gateway server
//!
//! This crate hosts the HTTP surface of the gateway. It is responsible for:
//! * Listening for incoming webhook requests from the partner platform, verifying their signatures, and
//!   acknowledging receipt as soon as the event is durably stored.
//! * Exposing the operator API: event inspection, manual retry, and order lifecycle actions.
//! * Wiring the engine's outbound traits to the partner's REST API.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/webhook`: The signed webhook intake route.
//! * `/api/...`: Operator routes, guarded by the `X-Api-Key` header.

pub mod cli;
pub mod config;
pub mod errors;

pub mod data_objects;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod order_routes;
pub mod routes;
pub mod server;
pub mod timeout_worker;
pub mod webhook_routes;

#[cfg(test)]
mod endpoint_tests;
