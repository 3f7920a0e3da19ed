//! Webhook target service
//!
//! A tiny HTTP server that records the body of the last webhook delivered to
//! `POST /registerRequest` and hands it back on `GET /lastRequest`. It is the
//! service the hookcheck harness exposes through a public tunnel.

mod service;
mod state;

pub use service::WebhookServer;
pub use state::LastRequestStore;

/// Port used when `PORT` is not set
pub const DEFAULT_PORT: u16 = 8081;
