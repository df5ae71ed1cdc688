//! Notification channel: fire-and-forget from the run's point of view.
//!
//! A notifier never returns an error: delivery failures are logged and the
//! run carries on.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::NotifyConfig;

pub const TELEGRAM_API: &str = "https://api.telegram.org";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Critical,
}

impl Severity {
    fn badge(self) -> &'static str {
        match self {
            Self::Info => "ℹ️ <b>INFO</b>",
            Self::Success => "✅ <b>SUCCESS</b>",
            Self::Warning => "⚠️ <b>WARNING</b>",
            Self::Critical => "❌ <b>CRITICAL</b>",
        }
    }
}

pub trait Notifier {
    fn notify(&self, message: &str, severity: Severity);
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info | Severity::Success => info!(target: "notify", %message),
            Severity::Warning => warn!(target: "notify", %message),
            Severity::Critical => error!(target: "notify", %message),
        }
    }
}

/// Telegram Bot API `sendMessage` with HTML formatting.
pub struct TelegramNotifier {
    client: reqwest::blocking::Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(
        token: impl Into<String>,
        chat_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: TELEGRAM_API.to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn send(&self, text: &str) -> Result<(), reqwest::Error> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        self.client
            .post(url)
            .json(&json!({
                "chat_id": self.chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()?
            .error_for_status()?;
        Ok(())
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        LogNotifier.notify(message, severity);
        let text = format!("{}\n\n{message}", severity.badge());
        if let Err(e) = self.send(&text) {
            // Never leak the bot token, which is part of the request URL.
            warn!(error = %e.without_url(), "telegram delivery failed");
        }
    }
}

/// Telegram when both token and chat id are set, the log otherwise.
pub fn from_config(config: &NotifyConfig, timeout: Duration) -> Box<dyn Notifier> {
    match (&config.telegram_bot_token, &config.telegram_chat_id) {
        (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
            match TelegramNotifier::new(token.clone(), chat.clone(), timeout) {
                Ok(notifier) => Box::new(notifier),
                Err(e) => {
                    warn!(error = %e, "telegram client unavailable, notifying via log");
                    Box::new(LogNotifier)
                }
            }
        }
        _ => Box::new(LogNotifier),
    }
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html() {
        assert_eq!(escape_html("a<b & c>d"), "a&lt;b &amp; c&gt;d");
    }

    #[test]
    fn missing_credentials_fall_back_to_log() {
        let config = NotifyConfig {
            telegram_bot_token: Some("123:abc".into()),
            telegram_chat_id: None,
            notify_no_action: false,
        };
        // Falls back without touching the network; notify must not panic.
        from_config(&config, Duration::from_secs(1)).notify("hello", Severity::Info);
    }

    #[test]
    fn unreachable_telegram_does_not_fail() {
        let notifier = TelegramNotifier::new("t", "c", Duration::from_millis(200))
            .unwrap()
            .with_api_base("http://127.0.0.1:9");
        notifier.notify("run finished", Severity::Warning);
    }
}
