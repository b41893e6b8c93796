//! Outbound message delivery
//!
//! The dispatcher decides *what* to send; implementations of
//! `MessageGateway` decide *how*. Delivery is best effort — the HTTP
//! gateway logs and swallows failures instead of propagating them back
//! into message handling.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

use crate::error::{AgentError, Result};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub delivered: bool,
    pub provider_message_id: Option<String>,
}

/// Seam between the dispatcher and the chat transport.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn send(
        &self,
        recipient_id: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<DeliveryResult>;
}

/// Token-authenticated HTTP gateway (connection-pooled)
pub struct HttpMessageGateway {
    client: Client,
    base_url: String,
    token: String,
    sender_name: String,
}

impl HttpMessageGateway {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(SEND_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
            sender_name: "Assistente".to_string(),
        }
    }

    pub fn with_sender_name(mut self, sender_name: impl Into<String>) -> Self {
        self.sender_name = sender_name.into();
        self
    }
}

#[async_trait]
impl MessageGateway for HttpMessageGateway {
    async fn send(
        &self,
        recipient_id: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<DeliveryResult> {
        let url = format!("{}/send/text", self.base_url.trim_end_matches('/'));

        let request = SendTextRequest {
            number: recipient_id.to_string(),
            text: text.to_string(),
            link_preview: false,
            reply_id: reply_to.map(str::to_string),
            read_chat: true,
            sender_name: self.sender_name.clone(),
            delay: 1000,
        };

        let response = self
            .client
            .post(&url)
            .header("token", &self.token)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("outbound send request failed: {}", e);
                AgentError::ExternalService(format!("gateway request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            error!("gateway rejected message with status {}", status);
            return Err(AgentError::ExternalService(format!(
                "gateway returned {}",
                status
            )));
        }

        let body: serde_json::Value = response.json().await.unwrap_or_default();
        let provider_message_id = body
            .get("id")
            .and_then(|id| id.as_str())
            .map(str::to_string);

        info!(recipient = recipient_id, "reply delivered");

        Ok(DeliveryResult {
            delivered: true,
            provider_message_id,
        })
    }
}

#[derive(Debug, Serialize)]
struct SendTextRequest {
    number: String,
    text: String,
    #[serde(rename = "linkPreview")]
    link_preview: bool,
    #[serde(rename = "replyid", skip_serializing_if = "Option::is_none")]
    reply_id: Option<String>,
    #[serde(rename = "readchat")]
    read_chat: bool,
    #[serde(rename = "senderName")]
    sender_name: String,
    delay: u32,
}

/// Prints replies to stdout. Used by the offline demo binary.
pub struct ConsoleGateway;

#[async_trait]
impl MessageGateway for ConsoleGateway {
    async fn send(
        &self,
        recipient_id: &str,
        text: &str,
        _reply_to: Option<&str>,
    ) -> Result<DeliveryResult> {
        println!("→ {}\n{}\n", recipient_id, text);
        Ok(DeliveryResult {
            delivered: true,
            provider_message_id: None,
        })
    }
}
