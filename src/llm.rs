//! Completion API client
//!
//! The core treats the hosted LLM as a black box: system instruction plus
//! user text in, free text or constrained JSON out. Uses a long-lived
//! reqwest::Client for connection pooling and a hard request timeout so a
//! slow provider can never hang the dispatcher.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

use crate::error::{AgentError, Result};

const DEFAULT_BASE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Tuning knobs for one completion call.
#[derive(Debug, Clone, Copy)]
pub struct CompletionOptions {
    pub json_mode: bool,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            json_mode: false,
            max_tokens: 1024,
            temperature: 0.3,
        }
    }
}

impl CompletionOptions {
    pub fn json() -> Self {
        Self {
            json_mode: true,
            ..Self::default()
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Seam between the core and the hosted completion provider.
#[async_trait]
pub trait CompletionApi: Send + Sync {
    async fn complete(
        &self,
        system_instruction: &str,
        user_text: &str,
        opts: CompletionOptions,
    ) -> Result<String>;
}

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl CompletionApi for GeminiClient {
    async fn complete(
        &self,
        system_instruction: &str,
        user_text: &str,
        opts: CompletionOptions,
    ) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(AgentError::ExternalService(
                "completion API key not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: user_text.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: opts.temperature,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: opts.max_tokens,
                response_mime_type: opts.json_mode.then(|| "application/json".to_string()),
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system_instruction.to_string(),
                }],
            },
        };

        info!(json_mode = opts.json_mode, "Calling completion API");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Completion API request failed: {}", e);
                AgentError::ExternalService(format!("completion request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Completion API error response ({}): {}", status, error_text);
            return Err(AgentError::ExternalService(format!(
                "completion API returned {}",
                status
            )));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            error!("Failed to parse completion response: {}", e);
            AgentError::ExternalService(format!("completion parse error: {}", e))
        })?;

        let text = parsed
            .candidates
            .first()
            .and_then(|candidate| candidate.content.parts.first())
            .map(|part| part.text.clone())
            .ok_or_else(|| {
                AgentError::ExternalService("empty completion response".to_string())
            })?;

        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
    #[serde(rename = "systemInstruction")]
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted completion client for tests.

    use super::*;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    pub struct MockCompletion {
        replies: Mutex<VecDeque<String>>,
        fail: bool,
    }

    impl MockCompletion {
        /// Replies are popped in order; an exhausted script fails the call.
        pub fn with_replies<I, S>(replies: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
                fail: false,
            }
        }

        /// A provider that is always down.
        pub fn failing() -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl CompletionApi for MockCompletion {
        async fn complete(
            &self,
            _system_instruction: &str,
            _user_text: &str,
            _opts: CompletionOptions,
        ) -> Result<String> {
            if self.fail {
                return Err(AgentError::ExternalService("mock provider down".to_string()));
            }

            self.replies.lock().await.pop_front().ok_or_else(|| {
                AgentError::ExternalService("mock script exhausted".to_string())
            })
        }
    }
}
