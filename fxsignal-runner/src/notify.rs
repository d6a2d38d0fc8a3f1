//! Output sinks for rendered messages.

use fxsignal_core::config::{DataConfig, TelegramConfig};
use fxsignal_core::data::{DataError, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Mutex;
use thiserror::Error;

/// Telegram rejects messages longer than this many characters.
const TELEGRAM_MAX_CHARS: usize = 4096;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifier not configured: {0}")]
    NotConfigured(String),

    #[error("delivery failed: {0}")]
    Delivery(#[from] DataError),

    #[error("message rejected: {0}")]
    Rejected(String),
}

/// Sink for rendered messages. Implementations must be shareable across
/// the worker threads of a cycle.
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    fn send(&self, message: &str) -> Result<(), NotifyError>;
}

/// Writes every message to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn send(&self, message: &str) -> Result<(), NotifyError> {
        tracing::info!(notifier = "log", "{message}");
        Ok(())
    }
}

/// Keeps messages in memory.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    messages: Mutex<Vec<String>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Notifier for CollectingNotifier {
    fn name(&self) -> &str {
        "collecting"
    }

    fn send(&self, message: &str) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.to_string());
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct TelegramReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ReplyParameters>,
}

#[derive(Debug, Deserialize)]
struct ReplyParameters {
    retry_after: Option<u64>,
}

/// Telegram Bot API `sendMessage` with HTML formatting.
pub struct TelegramNotifier {
    client: reqwest::blocking::Client,
    endpoint: String,
    chat_id: String,
    retry: RetryPolicy,
}

impl TelegramNotifier {
    pub fn new(telegram: &TelegramConfig, data: &DataConfig) -> Result<Self, NotifyError> {
        let token = telegram
            .bot_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| NotifyError::NotConfigured("telegram.bot_token is missing".into()))?;
        let chat_id = telegram
            .chat_id
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| NotifyError::NotConfigured("telegram.chat_id is missing".into()))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(data.request_timeout_secs))
            .build()
            .map_err(DataError::from)?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{}/sendMessage", telegram.api_base.trim_end_matches('/'), token),
            chat_id: chat_id.to_string(),
            retry: RetryPolicy::from_config(data),
        })
    }

    fn post(&self, text: &str) -> Result<TelegramReply, DataError> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };
        let response = self.client.post(&self.endpoint).json(&body).send()?;
        let status = response.status();
        if status.is_server_error() {
            return Err(DataError::HttpStatus {
                status: status.as_u16(),
                source_name: "telegram".into(),
            });
        }
        let reply: TelegramReply = response
            .json()
            .map_err(|e| DataError::ResponseFormatChanged(format!("telegram reply: {e}")))?;
        if status.as_u16() == 429 {
            let retry_after_secs = reply
                .parameters
                .as_ref()
                .and_then(|p| p.retry_after)
                .unwrap_or(1);
            return Err(DataError::RateLimited { retry_after_secs });
        }
        Ok(reply)
    }
}

impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    fn send(&self, message: &str) -> Result<(), NotifyError> {
        let text = truncate_html(message, TELEGRAM_MAX_CHARS);
        let reply = self.retry.run("telegram.sendMessage", |_| self.post(&text))?;
        if !reply.ok {
            let description = reply.description.unwrap_or_else(|| "unknown error".into());
            tracing::error!(notifier = "telegram", %description, "message rejected");
            return Err(NotifyError::Rejected(description));
        }
        tracing::debug!(notifier = "telegram", chars = text.chars().count(), "message sent");
        Ok(())
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// First `max` chars, backed off so no tag or entity is split.
fn cut_html(s: &str, max: usize) -> &str {
    let mut cut = truncate_chars(s, max);
    if let Some(lt) = cut.rfind('<') {
        if !cut[lt..].contains('>') {
            cut = &cut[..lt];
        }
    }
    if let Some(amp) = cut.rfind('&') {
        if !cut[amp..].contains(';') {
            cut = &cut[..amp];
        }
    }
    cut
}

/// Names of elements opened in `html` and not closed, outermost first.
fn open_tags(html: &str) -> Vec<&str> {
    let mut stack = Vec::new();
    let mut rest = html;
    while let Some(start) = rest.find('<') {
        let Some(len) = rest[start..].find('>') else {
            break;
        };
        let tag = &rest[start + 1..start + len];
        if let Some(name) = tag.strip_prefix('/') {
            if stack.last() == Some(&name.trim()) {
                stack.pop();
            }
        } else if let Some(name) = tag.split_whitespace().next() {
            stack.push(name);
        }
        rest = &rest[start + len + 1..];
    }
    stack
}

/// Truncate a Telegram HTML message to `max` chars, keeping it well formed:
/// tags and entities are never split and open elements are closed.
fn truncate_html(s: &str, max: usize) -> Cow<'_, str> {
    if s.chars().count() <= max {
        return Cow::Borrowed(s);
    }
    let mut budget = max;
    loop {
        let cut = cut_html(s, budget);
        let closing: String = open_tags(cut).iter().rev().map(|t| format!("</{t}>")).collect();
        let closing_len = closing.chars().count();
        if cut.chars().count() + closing_len <= max || budget == 0 {
            return Cow::Owned(format!("{cut}{closing}"));
        }
        budget = budget.saturating_sub(closing_len);
    }
}

/// Notifier for the configuration: Telegram when enabled, else the log.
pub fn from_config(telegram: &TelegramConfig, data: &DataConfig) -> Result<Box<dyn Notifier>, NotifyError> {
    if telegram.enabled {
        Ok(Box::new(TelegramNotifier::new(telegram, data)?))
    } else {
        Ok(Box::new(LogNotifier))
    }
}
