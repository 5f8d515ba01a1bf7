//! The byte-range-aware media relay.

pub mod forward;
pub mod range;

pub use forward::{Disposition, serve, serve_thumb};
