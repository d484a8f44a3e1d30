//! Telegram channel notifier (Bot API `sendMessage`)

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::alert::Notifier;
use crate::config::NotificationConfig;
use crate::error::{Error, Result};

const TELEGRAM_API: &str = "https://api.telegram.org";
const SERVICE: &str = "notification";

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
    channel_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &NotificationConfig, timeout: Duration) -> Result<Self> {
        if config.bot_token.is_empty() || config.channel_id.is_empty() {
            return Err(Error::Config(
                "notification requires bot_token and channel_id".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            bot_token: config.bot_token.clone(),
            channel_id: config.channel_id.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", TELEGRAM_API, self.bot_token)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn notify(&self, message: &str) -> Result<()> {
        let body = json!({
            "chat_id": self.channel_id,
            "text": message,
            "disable_web_page_preview": true,
        });

        // reqwest errors embed the URL, which carries the bot token
        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::unavailable(SERVICE, e.without_url()))?;

        let status = response.status();
        let parsed = response.json::<TelegramResponse>().await.ok();

        if status.is_success() && parsed.as_ref().map(|r| r.ok).unwrap_or(false) {
            return Ok(());
        }

        let description = parsed
            .and_then(|r| r.description)
            .unwrap_or_else(|| status.to_string());

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(Error::unavailable(SERVICE, description))
        } else {
            Err(Error::Config(format!("telegram rejected message: {}", description)))
        }
    }
}
