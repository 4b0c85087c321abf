//! Telegram Bot API channel

use async_trait::async_trait;
use serde::Deserialize;
use smallvec::SmallVec;
use std::time::Duration;

use crate::config::TelegramConfig;
use crate::error::ChannelError;
use crate::format::{telegram::default_message, template};
use crate::pipeline::Submission;
use crate::pipeline::deliver::{ChannelKind, DeliveryChannel};

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    ok: bool,
    description: Option<String>,
}

pub struct TelegramChannel {
    client: reqwest::Client,
    api_base: String,
}

impl TelegramChannel {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &TelegramConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    async fn send(&self, token: &str, chat_id: &str, text: &str) -> Result<(), String> {
        let url = format!("{}/bot{token}/sendMessage", self.api_base);
        let response = self
            .client
            .post(url)
            .form(&[("chat_id", chat_id), ("text", text), ("parse_mode", "HTML")])
            .send()
            .await
            // the request URL carries the bot token
            .map_err(|e| format!("Failed to send Telegram request: {}", e.without_url()))?;

        let body: Option<ApiResponse> = response.json().await.ok();
        match body {
            Some(ApiResponse { ok: true, .. }) => Ok(()),
            Some(ApiResponse { description, .. }) => Err(format!(
                "Telegram API error: {}",
                description.unwrap_or_else(|| "Unknown error".into())
            )),
            None => Err("Telegram API error: Unknown error".into()),
        }
    }
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    #[tracing::instrument(skip_all, fields(form = %submission.schema.slug))]
    async fn deliver(&self, submission: &Submission) -> Result<(), ChannelError> {
        let settings = &submission.schema.telegram;
        let token = settings.bot_token.trim();
        let chat_ids: SmallVec<[&str; 4]> = settings
            .chat_ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .collect();
        if token.is_empty() || chat_ids.is_empty() {
            return Err(ChannelError::TelegramConfig);
        }

        let text = match settings.template.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(t) => template::render(
                t,
                &submission.schema,
                &submission.data,
                &submission.received_at,
            ),
            None => default_message(&submission.schema, &submission.data, &submission.received_at),
        };

        let mut delivered = 0usize;
        let mut errors = Vec::new();
        for chat_id in chat_ids {
            match self.send(token, chat_id, &text).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!(chat_id, error = %e, "telegram chat failed");
                    errors.push(format!("Chat {chat_id}: {e}"));
                }
            }
        }

        if delivered == 0 {
            return Err(ChannelError::TelegramSend(errors.join(", ")));
        }
        Ok(())
    }
}
