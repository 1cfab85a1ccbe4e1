use async_trait::async_trait;
use teloxide::payloads::SendMessageSetters;
use teloxide::requests::Requester;
use teloxide::types::{ChatId, ParseMode};
use teloxide::Bot;
use tracing::{info, warn};

use common::{Error, NotificationSink, Result, SignalVerdict};

use crate::format::signal_html;

/// Posts verdicts to one or more Telegram chats.
pub struct TelegramNotifier {
    bot: Bot,
    chat_ids: Vec<i64>,
}

impl TelegramNotifier {
    /// Returns `None` when the token or chat list is missing, so the caller
    /// can run without chat delivery.
    pub fn new(token: Option<&str>, chat_ids: &[i64]) -> Option<Self> {
        let token = token.filter(|t| !t.is_empty());
        match token {
            Some(token) if !chat_ids.is_empty() => {
                info!(chats = chat_ids.len(), "Telegram notifier enabled");
                Some(Self {
                    bot: Bot::new(token),
                    chat_ids: chat_ids.to_vec(),
                })
            }
            _ => {
                warn!("Telegram notifier is not configured (missing token or chat ids)");
                None
            }
        }
    }

    /// Send to every chat. Fails if any chat could not be reached.
    async fn send_html(&self, text: &str) -> Result<()> {
        let mut failures = Vec::new();
        for &chat_id in &self.chat_ids {
            if let Err(e) = self
                .bot
                .send_message(ChatId(chat_id), text)
                .parse_mode(ParseMode::Html)
                .await
            {
                warn!(chat_id, error = %e, "Telegram send failed");
                failures.push(format!("chat {chat_id}: {e}"));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::sink(self.name(), failures.join("; ")))
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn notify(&self, verdict: &SignalVerdict) -> Result<()> {
        self.send_html(&signal_html(verdict)).await
    }

    async fn announce(&self, text: &str) -> Result<()> {
        self.send_html(text).await
    }
}
