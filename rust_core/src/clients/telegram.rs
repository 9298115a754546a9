//! Telegram Bot API Client
//!
//! Sends messages to individual chats and long-polls for inbound commands.
//! A 403 (bot blocked, user deactivated) or 410 from `sendMessage` is a
//! terminal delivery error; anything else is transient.

use super::transport::DeliveryTransport;
use crate::error::DeliveryError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";
const REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: serde_json::Value,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TelegramClient {
    http: Client,
    base_url: String,
    token: String,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, DEFAULT_API_BASE_URL)
    }

    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.base_url.trim_end_matches('/'),
            self.token,
            method
        )
    }

    /// Fetch pending updates after `offset`, waiting up to `timeout_secs`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        let resp = self
            .http
            .get(self.method_url("getUpdates"))
            .query(&[("offset", offset.to_string()), ("timeout", timeout_secs.to_string())])
            // Long poll outlives the default request timeout
            .timeout(Duration::from_secs(timeout_secs + REQUEST_TIMEOUT_SECS))
            .send()
            .await
            .context("Telegram getUpdates request failed")?;

        let status = resp.status();
        let body: ApiResponse<Vec<Update>> = resp
            .json()
            .await
            .with_context(|| format!("Telegram getUpdates returned unreadable body ({status})"))?;

        if !body.ok {
            anyhow::bail!(
                "Telegram getUpdates failed: {status} {}",
                body.description.unwrap_or_default()
            );
        }
        Ok(body.result.unwrap_or_default())
    }
}

/// Numeric chat ids go out as numbers, channel handles as strings
fn chat_id_value(recipient_id: &str) -> serde_json::Value {
    match recipient_id.parse::<i64>() {
        Ok(id) => serde_json::Value::from(id),
        Err(_) => serde_json::Value::from(recipient_id),
    }
}

#[async_trait]
impl DeliveryTransport for TelegramClient {
    async fn send(&self, recipient_id: &str, text: &str) -> Result<(), DeliveryError> {
        let body = SendMessageRequest {
            chat_id: chat_id_value(recipient_id),
            text,
        };

        let resp = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(format!("sendMessage request failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let text = resp.text().await.unwrap_or_default();
        Err(DeliveryError::from_status(recipient_id, status.as_u16(), &text))
    }
}
