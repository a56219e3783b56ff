//! Decision provider for OpenAI-compatible `/chat/completions` endpoints.
//!
//! OpenAI, Mistral and a local Ollama all speak the same wire format; they
//! differ only in base URL and whether a bearer key is required.

use std::time::Duration;

use async_trait::async_trait;
use drivethru_core::config::LlmConfig;
use drivethru_core::domain::conversation::{ChatMessage, ToolCall};
use reqwest::header::HeaderValue;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::llm::{Decision, DecisionError, DecisionProvider, DecisionRequest, ToolSignature};

pub struct OpenAiCompatibleProvider {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OpenAiCompatibleProvider {
    pub fn from_config(config: &LlmConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.effective_base_url().trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: config.timeout(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn map_transport_error(&self, error: reqwest::Error) -> DecisionError {
        if error.is_timeout() {
            DecisionError::Timeout(self.timeout)
        } else {
            DecisionError::Connection(error.to_string())
        }
    }
}

#[async_trait]
impl DecisionProvider for OpenAiCompatibleProvider {
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, DecisionError> {
        let body = build_request_body(&self.model, self.temperature, request);
        let mut call = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            call = call.bearer_auth(api_key.expose_secret());
        }

        let response = call.send().await.map_err(|error| self.map_transport_error(error))?;
        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers().get("retry-after"));
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, body, retry_after));
        }

        let raw = response.text().await.map_err(|error| self.map_transport_error(error))?;
        debug!(
            event_name = "llm.response.received",
            model = %self.model,
            bytes = raw.len(),
            "decision provider responded"
        );
        parse_response(&raw)
    }
}

pub fn build_request_body(model: &str, temperature: f32, request: DecisionRequest<'_>) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.push(json!({ "role": "system", "content": request.system_prompt }));
    messages.extend(request.messages.iter().map(wire_message));

    let mut body = json!({
        "model": model,
        "temperature": temperature,
        "messages": messages,
    });
    if !request.tools.is_empty() {
        body["tools"] = Value::Array(request.tools.iter().map(wire_tool).collect());
        body["tool_choice"] = json!("auto");
    }
    body
}

fn wire_message(message: &ChatMessage) -> Value {
    match message {
        ChatMessage::User { content } => json!({ "role": "user", "content": content }),
        ChatMessage::Assistant { content, tool_calls } if tool_calls.is_empty() => {
            json!({ "role": "assistant", "content": content })
        }
        ChatMessage::Assistant { content, tool_calls } => {
            let calls: Vec<Value> = tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": { "name": call.name, "arguments": call.arguments.to_string() },
                    })
                })
                .collect();
            json!({ "role": "assistant", "content": content, "tool_calls": calls })
        }
        ChatMessage::Tool { tool_call_id, name, content } => json!({
            "role": "tool",
            "tool_call_id": tool_call_id,
            "name": name,
            "content": content.to_string(),
        }),
    }
}

fn wire_tool(signature: &ToolSignature) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": signature.name,
            "description": signature.description,
            "parameters": signature.parameters,
        },
    })
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

pub fn parse_response(raw: &str) -> Result<Decision, DecisionError> {
    let parsed: CompletionResponse = serde_json::from_str(raw)
        .map_err(|error| DecisionError::MalformedOutput(format!("response was not valid json: {error}")))?;
    let message = parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| DecisionError::MalformedOutput("response contained no choices".to_string()))?;

    let tool_calls = message
        .tool_calls
        .into_iter()
        .map(|call| {
            let arguments = if call.function.arguments.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&call.function.arguments).map_err(|error| {
                    DecisionError::MalformedOutput(format!(
                        "arguments for `{}` were not valid json: {error}",
                        call.function.name
                    ))
                })?
            };
            Ok(ToolCall::new(call.id, call.function.name, arguments))
        })
        .collect::<Result<Vec<_>, DecisionError>>()?;

    Ok(Decision { content: message.content.unwrap_or_default(), tool_calls })
}

fn map_http_error(status: StatusCode, body: String, retry_after: Option<Duration>) -> DecisionError {
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|value| value["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(body);

    match status {
        StatusCode::TOO_MANY_REQUESTS => DecisionError::RateLimited { retry_after },
        StatusCode::REQUEST_TIMEOUT => DecisionError::Unavailable { status: status.as_u16(), message },
        status if status.is_server_error() => {
            DecisionError::Unavailable { status: status.as_u16(), message }
        }
        status => DecisionError::Rejected { status: status.as_u16(), message },
    }
}

fn parse_retry_after(header: Option<&HeaderValue>) -> Option<Duration> {
    let value = header?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
