//! Inbound email channel: webhook parsing, HTTP routes, provider API.

pub mod provider;
pub mod routes;
pub mod webhook;

pub use provider::{EmailProvider, ResendClient, create_email_provider};
pub use routes::{AppState, router};
pub use webhook::parse_webhook;
