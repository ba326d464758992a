use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Deserialize;

/// One text message from the monitored chat. Metadata beyond the text is
/// carried for audit logging only.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: i64,
    pub text: String,
    pub sender: Option<String>,
    pub has_media: bool,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    photo: Option<serde_json::Value>,
    #[serde(default)]
    document: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Me {
    username: Option<String>,
}

/// Bot-API long-poll listener for one chat. Messages arrive at-least-once in
/// order; the offset acknowledges everything already handed out.
pub struct TelegramListener {
    client: Client,
    base_url: String,
    chat_id: i64,
    poll_timeout_secs: u64,
    offset: i64,
}

impl TelegramListener {
    pub fn new(bot_token: &str, chat_id: i64, poll_timeout_secs: u64) -> Result<Self> {
        // Client timeout must outlive the server-side long-poll window.
        let client = Client::builder()
            .timeout(Duration::from_secs(poll_timeout_secs + 10))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("https://api.telegram.org/bot{}", bot_token),
            chat_id,
            poll_timeout_secs,
            offset: 0,
        })
    }

    /// Verify the token works; returns the bot's username for the startup log.
    pub async fn get_me(&self) -> Result<String> {
        let url = format!("{}/getMe", self.base_url);
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("Telegram getMe failed: {}", error_text));
        }

        let body = response.json::<ApiResponse<Me>>().await?;
        if !body.ok {
            return Err(anyhow!(
                "Telegram getMe rejected: {}",
                body.description.unwrap_or_default()
            ));
        }
        Ok(body
            .result
            .and_then(|m| m.username)
            .unwrap_or_else(|| "<unnamed bot>".to_string()))
    }

    /// Long-poll for the next batch of messages in the monitored chat.
    /// Messages from other chats advance the offset but are dropped.
    pub async fn poll(&mut self) -> Result<Vec<IncomingMessage>> {
        let url = format!("{}/getUpdates", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("timeout", self.poll_timeout_secs.to_string()),
                ("offset", self.offset.to_string()),
                ("allowed_updates", "[\"message\"]".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!("Telegram getUpdates failed: {}", error_text));
        }

        let body = response.json::<ApiResponse<Vec<Update>>>().await?;
        if !body.ok {
            return Err(anyhow!(
                "Telegram getUpdates rejected: {}",
                body.description.unwrap_or_default()
            ));
        }

        let updates = body.result.unwrap_or_default();
        let mut messages = Vec::new();
        for update in updates {
            if update.update_id >= self.offset {
                self.offset = update.update_id + 1;
            }
            let Some(message) = update.message else {
                continue;
            };
            if message.chat.id != self.chat_id {
                tracing::debug!(chat_id = message.chat.id, "dropping message from other chat");
                continue;
            }
            let has_media = message.photo.is_some() || message.document.is_some();
            let text = message
                .text
                .or(message.caption)
                .unwrap_or_default();
            if text.is_empty() {
                continue;
            }
            let sender = message
                .from
                .map(|u| u.username.or(u.first_name).unwrap_or_default());
            messages.push(IncomingMessage {
                id: message.message_id,
                text,
                sender,
                has_media,
            });
        }
        Ok(messages)
    }
}
