use crate::config::InferenceConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Sends a prompt to a text-generation backend and returns its raw JSON
/// payload. Non-2xx responses and transport failures are errors.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Value>;
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
    pub options: GenerateOptions,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub top_p: f32,
}

/// Client for an Ollama-compatible `/api/generate` endpoint.
pub struct OllamaClient {
    client: Client,
    endpoint: String,
    model: String,
    options: GenerateOptions,
    probe_timeout: Duration,
}

impl OllamaClient {
    pub fn from_config(config: &InferenceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("phishguard/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build inference HTTP client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            options: GenerateOptions {
                temperature: config.temperature,
                top_p: config.top_p,
            },
            probe_timeout: Duration::from_secs(config.probe_timeout_seconds),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// True when the backend answers its base URL with 200.
    pub async fn probe(&self) -> bool {
        let response = self
            .client
            .get(&self.endpoint)
            .timeout(self.probe_timeout)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let ok = resp.status() == reqwest::StatusCode::OK;
                log::info!("Inference backend at {} available: {ok}", self.endpoint);
                ok
            }
            Err(e) => {
                log::warn!("Inference backend health check failed: {e}");
                false
            }
        }
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<Value> {
        let url = format!("{}/api/generate", self.endpoint);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: self.options,
        };

        log::info!("Connecting to inference backend at {}", self.endpoint);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    log::error!("Connection refused at {}: {e}", self.endpoint);
                    anyhow!("Cannot connect to inference backend at {}", self.endpoint)
                } else {
                    log::error!("Failed to query inference backend: {e}");
                    anyhow!("Inference request failed: {e}")
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("Inference API error ({status}): {body}");
            return Err(anyhow!("Inference API returned status {}", status.as_u16()));
        }

        response
            .json::<Value>()
            .await
            .context("Inference response was not JSON")
    }
}

/// The response shapes seen from generation backends, in lookup priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEnvelope {
    /// `{"response": "..."}`
    Flat(String),
    /// `{"choices": [{"content": "..."}]}`
    ChoiceContent(String),
    /// `{"choices": [{"text": "..."}]}`
    ChoiceText(String),
    /// `{"choices": [{"message": {"content": "..."}}]}`
    ChoiceMessage(String),
    /// Anything else, serialized whole
    Raw(String),
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl ResponseEnvelope {
    pub fn classify(payload: &Value) -> Self {
        if let Some(text) = non_empty_str(payload.get("response")) {
            return Self::Flat(text);
        }

        let first_choice = payload
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .filter(|choice| choice.is_object());

        if let Some(choice) = first_choice {
            if let Some(text) = non_empty_str(choice.get("content")) {
                return Self::ChoiceContent(text);
            }
            if let Some(text) = non_empty_str(choice.get("text")) {
                return Self::ChoiceText(text);
            }
            let message = choice.get("message").filter(|m| m.is_object());
            if let Some(text) = non_empty_str(message.and_then(|m| m.get("content"))) {
                return Self::ChoiceMessage(text);
            }
        }

        Self::Raw(payload.to_string())
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Flat(text)
            | Self::ChoiceContent(text)
            | Self::ChoiceText(text)
            | Self::ChoiceMessage(text)
            | Self::Raw(text) => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_response() {
        let payload = json!({"model": "m", "response": "{\"a\":1}", "done": true});
        assert_eq!(
            ResponseEnvelope::classify(&payload),
            ResponseEnvelope::Flat("{\"a\":1}".to_string())
        );
    }

    #[test]
    fn test_choice_priority() {
        let both = json!({"choices": [{"content": "c", "text": "t"}]});
        assert_eq!(
            ResponseEnvelope::classify(&both),
            ResponseEnvelope::ChoiceContent("c".to_string())
        );

        let text = json!({"choices": [{"text": "t"}, {"content": "ignored"}]});
        assert_eq!(
            ResponseEnvelope::classify(&text),
            ResponseEnvelope::ChoiceText("t".to_string())
        );

        let message = json!({"choices": [{"message": {"role": "assistant", "content": "m"}}]});
        assert_eq!(
            ResponseEnvelope::classify(&message),
            ResponseEnvelope::ChoiceMessage("m".to_string())
        );
    }

    #[test]
    fn test_empty_flat_falls_through_to_choices() {
        let payload = json!({"response": "", "choices": [{"text": "t"}]});
        assert_eq!(ResponseEnvelope::classify(&payload).into_text(), "t");
    }

    #[test]
    fn test_unknown_shape_is_serialized() {
        let payload = json!({"output": "x"});
        assert_eq!(
            ResponseEnvelope::classify(&payload),
            ResponseEnvelope::Raw("{\"output\":\"x\"}".to_string())
        );

        let empty_message = json!({"choices": [{"message": {"content": ""}}]});
        assert!(matches!(
            ResponseEnvelope::classify(&empty_message),
            ResponseEnvelope::Raw(_)
        ));
    }

    #[test]
    fn test_request_body_shape() {
        let request = GenerateRequest {
            model: "llama3",
            prompt: "hi",
            stream: false,
            options: GenerateOptions {
                temperature: 0.5,
                top_p: 0.75,
            },
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "llama3",
                "prompt": "hi",
                "stream": false,
                "options": {"temperature": 0.5, "top_p": 0.75}
            })
        );
    }

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let config = InferenceConfig {
            endpoint: "http://localhost:11434/".to_string(),
            ..InferenceConfig::default()
        };
        let client = OllamaClient::from_config(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434");
        assert_eq!(client.model(), "gpt-oss:latest");
    }

    #[tokio::test]
    async fn test_probe_unreachable_backend() {
        let config = InferenceConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            probe_timeout_seconds: 2,
            ..InferenceConfig::default()
        };
        let client = OllamaClient::from_config(&config).unwrap();
        assert!(!client.probe().await);
    }
}
