use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use parley_core::config::{LlmConfig, LlmProvider};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecisionError {
    #[error("decision transport failed: {0}")]
    Transport(String),
    #[error("decision provider returned status {status}: {message}")]
    Provider { status: u16, message: String },
    #[error("decision response could not be decoded: {0}")]
    Decode(String),
}

/// One tool definition for a structured decision call. Exactly one schema is
/// supplied per call; the provider is forced to answer through it.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// What a structured call came back with. Free text where a tool call was
/// expected is not an error at this layer; the caller treats it as "no
/// actionable result".
#[derive(Clone, Debug, PartialEq)]
pub enum StructuredResponse {
    ToolCall { name: String, args: Value },
    Text(String),
}

/// The delegated decision-making capability. Implementations decide what the
/// agent says or does next; the session runtime decides when to ask.
#[async_trait]
pub trait DecisionClient: Send + Sync {
    async fn decide(
        &self,
        system_prompt: &str,
        conversation_tail: &str,
    ) -> Result<String, DecisionError>;

    async fn decide_structured(
        &self,
        system_prompt: &str,
        conversation_tail: &str,
        schema: &ToolSchema,
    ) -> Result<StructuredResponse, DecisionError>;
}

/// HTTP-backed decision client speaking either the OpenAI-compatible chat
/// completions protocol (OpenAI, Ollama) or the Anthropic messages protocol.
/// Transient failures are retried with exponential backoff before surfacing.
pub struct HttpDecisionClient {
    client: reqwest::Client,
    config: LlmConfig,
}

#[derive(Clone, Copy, Debug)]
struct RetryPolicy {
    max_retries: u32,
    base_delay_ms: u64,
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        Duration::from_millis(self.base_delay_ms.saturating_mul(multiplier).min(5_000))
    }
}

impl HttpDecisionClient {
    pub fn new(config: LlmConfig) -> Result<Self, DecisionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| DecisionError::Transport(error.to_string()))?;
        Ok(Self { client, config })
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy { max_retries: self.config.max_retries, base_delay_ms: 250 }
    }

    fn endpoint(&self) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(match self.config.provider {
                LlmProvider::OpenAi => "https://api.openai.com",
                LlmProvider::Anthropic => "https://api.anthropic.com",
                LlmProvider::Ollama => "http://localhost:11434",
            })
            .trim_end_matches('/')
            .to_owned();

        match self.config.provider {
            LlmProvider::Anthropic => format!("{base}/v1/messages"),
            LlmProvider::OpenAi | LlmProvider::Ollama => format!("{base}/v1/chat/completions"),
        }
    }

    fn request_body(
        &self,
        system_prompt: &str,
        conversation_tail: &str,
        schema: Option<&ToolSchema>,
    ) -> Value {
        match self.config.provider {
            LlmProvider::Anthropic => {
                let mut body = json!({
                    "model": self.config.model,
                    "max_tokens": 1024,
                    "system": system_prompt,
                    "messages": [{"role": "user", "content": conversation_tail}],
                });
                if let Some(schema) = schema {
                    body["tools"] = json!([{
                        "name": schema.name,
                        "description": schema.description,
                        "input_schema": schema.parameters,
                    }]);
                    body["tool_choice"] = json!({"type": "tool", "name": schema.name});
                }
                body
            }
            LlmProvider::OpenAi | LlmProvider::Ollama => {
                let mut body = json!({
                    "model": self.config.model,
                    "messages": [
                        {"role": "system", "content": system_prompt},
                        {"role": "user", "content": conversation_tail},
                    ],
                });
                if let Some(schema) = schema {
                    body["tools"] = json!([{
                        "type": "function",
                        "function": {
                            "name": schema.name,
                            "description": schema.description,
                            "parameters": schema.parameters,
                        },
                    }]);
                    body["tool_choice"] =
                        json!({"type": "function", "function": {"name": schema.name}});
                }
                body
            }
        }
    }

    async fn post(&self, body: &Value) -> Result<Value, DecisionError> {
        let mut request = self.client.post(self.endpoint()).json(body);

        if let Some(api_key) = &self.config.api_key {
            request = match self.config.provider {
                LlmProvider::Anthropic => request
                    .header("x-api-key", api_key.expose_secret())
                    .header("anthropic-version", "2023-06-01"),
                LlmProvider::OpenAi | LlmProvider::Ollama => {
                    request.bearer_auth(api_key.expose_secret())
                }
            };
        }

        let response =
            request.send().await.map_err(|error| DecisionError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DecisionError::Provider { status: status.as_u16(), message });
        }

        response.json().await.map_err(|error| DecisionError::Decode(error.to_string()))
    }

    async fn post_with_retry(&self, body: &Value) -> Result<Value, DecisionError> {
        let policy = self.retry_policy();
        let mut last_error = DecisionError::Transport("no attempt made".to_owned());

        for attempt in 0..=policy.max_retries {
            match self.post(body).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    warn!(
                        attempt,
                        max_retries = policy.max_retries,
                        error = %error,
                        "decision call failed"
                    );
                    last_error = error;
                    if attempt < policy.max_retries {
                        tokio::time::sleep(policy.backoff(attempt)).await;
                    }
                }
            }
        }

        Err(last_error)
    }

    fn extract_text(&self, response: &Value) -> Result<String, DecisionError> {
        let text = match self.config.provider {
            LlmProvider::Anthropic => response["content"]
                .as_array()
                .and_then(|blocks| {
                    blocks.iter().find_map(|block| {
                        (block["type"] == "text").then(|| block["text"].as_str()).flatten()
                    })
                })
                .map(str::to_owned),
            LlmProvider::OpenAi | LlmProvider::Ollama => {
                response["choices"][0]["message"]["content"].as_str().map(str::to_owned)
            }
        };

        text.ok_or_else(|| DecisionError::Decode("response carried no text content".to_owned()))
    }

    fn extract_structured(&self, response: &Value) -> StructuredResponse {
        match self.config.provider {
            LlmProvider::Anthropic => {
                let tool_use = response["content"].as_array().and_then(|blocks| {
                    blocks.iter().find(|block| block["type"] == "tool_use")
                });
                if let Some(block) = tool_use {
                    return StructuredResponse::ToolCall {
                        name: block["name"].as_str().unwrap_or_default().to_owned(),
                        args: block["input"].clone(),
                    };
                }
            }
            LlmProvider::OpenAi | LlmProvider::Ollama => {
                let tool_call = &response["choices"][0]["message"]["tool_calls"][0]["function"];
                if let Some(name) = tool_call["name"].as_str() {
                    let args = tool_call["arguments"]
                        .as_str()
                        .and_then(|raw| serde_json::from_str(raw).ok())
                        .unwrap_or_else(|| tool_call["arguments"].clone());
                    return StructuredResponse::ToolCall { name: name.to_owned(), args };
                }
            }
        }

        StructuredResponse::Text(self.extract_text(response).unwrap_or_default())
    }
}

#[async_trait]
impl DecisionClient for HttpDecisionClient {
    async fn decide(
        &self,
        system_prompt: &str,
        conversation_tail: &str,
    ) -> Result<String, DecisionError> {
        let body = self.request_body(system_prompt, conversation_tail, None);
        let response = self.post_with_retry(&body).await?;
        self.extract_text(&response)
    }

    async fn decide_structured(
        &self,
        system_prompt: &str,
        conversation_tail: &str,
        schema: &ToolSchema,
    ) -> Result<StructuredResponse, DecisionError> {
        let body = self.request_body(system_prompt, conversation_tail, Some(schema));
        let response = self.post_with_retry(&body).await?;
        Ok(self.extract_structured(&response))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{HttpDecisionClient, StructuredResponse, ToolSchema};
    use parley_core::config::{AppConfig, LlmProvider};

    fn client_for(provider: LlmProvider) -> HttpDecisionClient {
        let mut config = AppConfig::default().llm;
        config.provider = provider;
        config.api_key = Some("sk-test".to_owned().into());
        config.base_url = Some("http://localhost:9".to_owned());
        HttpDecisionClient::new(config).expect("client builds")
    }

    fn schema() -> ToolSchema {
        ToolSchema {
            name: "report_turn".to_owned(),
            description: "Report the outcome of one turn".to_owned(),
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    #[test]
    fn openai_body_carries_forced_tool_choice() {
        let client = client_for(LlmProvider::OpenAi);
        let body = client.request_body("sys", "tail", Some(&schema()));

        assert_eq!(body["tool_choice"]["function"]["name"], "report_turn");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["tools"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn anthropic_body_uses_messages_protocol() {
        let client = client_for(LlmProvider::Anthropic);
        let body = client.request_body("sys", "tail", Some(&schema()));

        assert_eq!(body["system"], "sys");
        assert_eq!(body["tool_choice"]["type"], "tool");
        assert_eq!(body["tools"][0]["name"], "report_turn");
    }

    #[test]
    fn openai_tool_call_is_extracted_from_stringified_arguments() {
        let client = client_for(LlmProvider::OpenAi);
        let response = json!({
            "choices": [{"message": {"tool_calls": [{"function": {
                "name": "report_turn",
                "arguments": "{\"human_detected\": true}",
            }}]}}],
        });

        let structured = client.extract_structured(&response);
        assert_eq!(
            structured,
            StructuredResponse::ToolCall {
                name: "report_turn".to_owned(),
                args: json!({"human_detected": true}),
            }
        );
    }

    #[test]
    fn anthropic_tool_use_block_is_extracted() {
        let client = client_for(LlmProvider::Anthropic);
        let response = json!({
            "content": [
                {"type": "text", "text": "thinking aloud"},
                {"type": "tool_use", "name": "report_turn", "input": {"is_commitment": false}},
            ],
        });

        let structured = client.extract_structured(&response);
        assert_eq!(
            structured,
            StructuredResponse::ToolCall {
                name: "report_turn".to_owned(),
                args: json!({"is_commitment": false}),
            }
        );
    }

    #[test]
    fn missing_tool_call_degrades_to_text() {
        let client = client_for(LlmProvider::OpenAi);
        let response = json!({
            "choices": [{"message": {"content": "I would rather chat freely"}}],
        });

        let structured = client.extract_structured(&response);
        assert_eq!(structured, StructuredResponse::Text("I would rather chat freely".to_owned()));
    }
}
