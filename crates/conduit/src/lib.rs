//! Conduit - unbuffered streaming relay for a token-authenticated inference API
//!
//! The crate is split into two core pieces and a thin HTTP layer:
//! - [`auth`] keeps a short-lived bearer token fresh for every caller
//! - [`relay`] forwards one upstream stream per request, chunk for chunk
//! - [`server`] exposes both over axum

pub mod auth;
pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod testing;

pub use error::ConduitError;
