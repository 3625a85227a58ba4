//! Inbound GitHub webhook deliveries.
//!
//! - [`signature`]: HMAC-SHA256 verification of the raw body
//! - [`events`]: push payload parsing and branch derivation

pub mod events;
pub mod signature;

pub use events::{EventError, PushAction, PushEvent, is_connectivity_check};
pub use signature::{SignatureError, signature_header, verify_signature};
