//! Telegram Bot API transport.
//!
//! Each delivery is a two-step fallback chain: a Markdown `sendMessage`,
//! then, if Telegram refuses it, the same text stripped of Markdown.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::traits::BaseDelivery;

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    result: Option<SentMessage>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

pub struct TelegramDelivery {
    client: reqwest::Client,
    api_base: String,
    token: String,
    chats: HashMap<String, String>,
}

impl TelegramDelivery {
    /// `chats` maps channel names to Telegram chat ids.
    pub fn new(token: impl Into<String>, chats: HashMap<String, String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Telegram HTTP client")?;

        Ok(Self {
            client,
            api_base: "https://api.telegram.org".to_string(),
            token: token.into(),
            chats,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn has_chat(&self, channel: &str) -> bool {
        self.chats.contains_key(channel)
    }

    async fn send_message(&self, chat_id: &str, text: &str, markdown: bool) -> Result<String> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let request = SendMessageRequest {
            chat_id,
            text,
            disable_web_page_preview: true,
            parse_mode: markdown.then_some("Markdown"),
        };

        let response: TelegramResponse = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("Telegram request failed: {}", e.without_url()))?
            .json()
            .await
            .context("Telegram returned an unreadable response")?;

        if !response.ok {
            bail!(
                "Telegram rejected message: {}",
                response.description.unwrap_or_else(|| "no description".to_string())
            );
        }

        response
            .result
            .map(|sent| sent.message_id.to_string())
            .context("Telegram response missing message_id")
    }
}

/// Drop Markdown control characters.
pub fn strip_markdown(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '*' | '_' | '[' | ']'))
        .collect()
}

#[async_trait]
impl BaseDelivery for TelegramDelivery {
    async fn deliver(&self, channel: &str, content: &str) -> Result<String> {
        let chat_id = self
            .chats
            .get(channel)
            .with_context(|| format!("No Telegram chat configured for channel {}", channel))?;

        match self.send_message(chat_id, content, true).await {
            Ok(message_id) => {
                debug!(channel = %channel, message_id = %message_id, "Message sent");
                Ok(message_id)
            }
            Err(e) => {
                warn!(channel = %channel, error = %e, "Markdown send failed, retrying as plain text");
                self.send_message(chat_id, &strip_markdown(content), false).await
            }
        }
    }
}
