//! Request handlers for the intake server.

mod health;
mod metrics;
mod webhooks;

pub use health::health_check;
pub use metrics::metrics;
pub use webhooks::{create_webhook, CreateWebhookRequest, CreateWebhookResponse};
