//! mediaferry: a webhook-driven Telegram media relay.
//!
//! Inbound Bot API updates are parsed for media attachments and recorded in a
//! metadata store; stored files are then re-exposed to ordinary HTTP clients
//! through range-capable streaming endpoints that fetch the bytes back from
//! Telegram on demand.

pub mod config;
pub mod error;
pub mod ingest;
pub mod relay;
pub mod server;
pub mod store;
pub mod telegram;
