//! Schema-driven form submission relay.
//!
//! A submission is checked by the guard chain, resolved against its form
//! schema, authorized, sanitized and validated, then fanned out to every
//! enabled delivery channel. It is accepted when at least one channel
//! delivered.

pub mod audit;
pub mod cache;
pub mod channels;
pub mod commands;
pub mod config;
pub mod error;
pub mod filters;
pub mod format;
pub mod http;
pub mod limits;
pub mod loader;
pub mod pipeline;
pub mod prelude;
pub mod schema;
pub mod server;
pub mod store;
pub mod uploads;
