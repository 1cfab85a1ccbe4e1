//! Notification sinks for admitted verdicts, plus the liveness heartbeat.

pub mod format;
pub mod heartbeat;
pub mod telegram;
pub mod webhook;

pub use heartbeat::Heartbeat;
pub use telegram::TelegramNotifier;
pub use webhook::WebhookNotifier;
