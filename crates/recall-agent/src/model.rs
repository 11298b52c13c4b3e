use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::{Value, json};
use tracing::warn;

use recall_core::Role;

use crate::schema::ToolSchema;

const DEFAULT_COOLDOWN: Duration = Duration::from_secs(600);

/// One message supplied to the model as context.
#[derive(Debug, Clone)]
pub struct ModelMessage {
    pub role: Role,
    pub content: String,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub name: String,
    pub arguments: Value,
}

/// One model round: either a final textual answer or tool requests that
/// feed back into the loop.
#[derive(Debug, Clone)]
pub enum ModelTurn {
    Final(String),
    ToolCalls(Vec<ToolRequest>),
}

/// Trait at the model seam so the agent loop is testable with scripted
/// fakes and swappable across OpenAI-compatible providers.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[ModelMessage],
        tools: &[ToolSchema],
    ) -> Result<ModelTurn>;
}

/// OpenAI-compatible chat-completions client with model failover.
#[derive(Debug)]
pub struct ApiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    rotator: Mutex<ModelRotator>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        models_csv: &str,
    ) -> Result<Self> {
        let models: Vec<String> = models_csv
            .split(',')
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .map(ToOwned::to_owned)
            .collect();

        if models.is_empty() {
            bail!("at least one model is required for ApiClient");
        }

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            rotator: Mutex::new(ModelRotator::new(models)),
        })
    }

    async fn run_chat_completion(&self, body_template: &Value) -> Result<Value> {
        loop {
            let model = {
                let mut rotator = self
                    .rotator
                    .lock()
                    .map_err(|_| anyhow!("model rotator poisoned"))?;
                if rotator.all_exhausted() {
                    bail!("all chat models are currently in cooldown");
                }
                rotator.next_available().to_string()
            };

            let mut body = body_template.clone();
            body["model"] = json!(model);

            let url = format!("{}/chat/completions", self.base_url);
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .with_context(|| format!("chat request failed for model {model}"))?;

            let status = response.status();
            let headers = response.headers().clone();
            let text = response
                .text()
                .await
                .with_context(|| format!("failed to read response body for model {model}"))?;

            if status.is_success() {
                return serde_json::from_str(&text)
                    .context("failed to parse chat completion response JSON");
            }

            if is_rate_or_quota_error(status, &text) {
                let cooldown = parse_retry_after(&headers).unwrap_or(DEFAULT_COOLDOWN);
                let (has_next, next_model) = {
                    let mut rotator = self
                        .rotator
                        .lock()
                        .map_err(|_| anyhow!("model rotator poisoned"))?;
                    rotator.mark_exhausted(&model, cooldown);
                    let has_next = !rotator.all_exhausted();
                    let next_model = if has_next {
                        Some(rotator.peek_next_available().to_string())
                    } else {
                        None
                    };
                    (has_next, next_model)
                };

                if has_next {
                    if let Some(new_model) = next_model {
                        warn!(
                            "chat model failover: {} -> {} (cooldown {}s)",
                            model,
                            new_model,
                            cooldown.as_secs()
                        );
                    }
                    continue;
                }

                bail!(
                    "all chat models exhausted after rate/quota limit; last model: {model}, status: {status}"
                );
            }

            return Err(anyhow!(
                "chat request failed for model {model}: status {status}, body {text}"
            ));
        }
    }
}

#[async_trait]
impl ModelClient for ApiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[ModelMessage],
        tools: &[ToolSchema],
    ) -> Result<ModelTurn> {
        let mut wire_messages = vec![json!({"role": "system", "content": system_prompt})];
        for message in messages {
            wire_messages.push(to_wire_message(message));
        }

        let body = json!({
            "messages": wire_messages,
            "tools": tools.iter().map(ToolSchema::to_wire).collect::<Vec<_>>(),
            "temperature": 0.1,
        });

        let response = self.run_chat_completion(&body).await?;
        parse_model_turn(&response)
    }
}

/// The session log keeps tool results as `tool` role entries but does not
/// keep the per-call ids the OpenAI wire protocol pairs them with, so tool
/// context is replayed as user content instead.
fn to_wire_message(message: &ModelMessage) -> Value {
    match message.role {
        Role::User => json!({"role": "user", "content": message.content}),
        Role::Assistant => json!({"role": "assistant", "content": message.content}),
        Role::Tool => json!({
            "role": "user",
            "content": format!("[tool results]\n{}", message.content),
        }),
    }
}

fn parse_model_turn(response: &Value) -> Result<ModelTurn> {
    let message = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| anyhow!("missing choices[0].message in completion response"))?;

    if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array)
        && !tool_calls.is_empty()
    {
        let mut requests = Vec::with_capacity(tool_calls.len());
        for call in tool_calls {
            let function = call
                .get("function")
                .ok_or_else(|| anyhow!("tool call without function payload"))?;
            let name = function
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("tool call without function name"))?
                .to_string();
            let arguments = match function.get("arguments") {
                // Most providers return arguments as a JSON-encoded string.
                Some(Value::String(raw)) => serde_json::from_str(raw)
                    .with_context(|| format!("malformed arguments for tool {name}"))?,
                Some(value) => value.clone(),
                None => json!({}),
            };
            requests.push(ToolRequest { name, arguments });
        }
        return Ok(ModelTurn::ToolCalls(requests));
    }

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("completion response has neither tool_calls nor content"))?;
    Ok(ModelTurn::Final(content.to_string()))
}

/// Round-robin over configured models, skipping those in cooldown after a
/// rate or quota rejection.
#[derive(Debug, Clone)]
pub struct ModelRotator {
    models: Vec<String>,
    cooldowns: HashMap<String, Instant>,
    current_index: usize,
}

impl ModelRotator {
    pub fn new(models: Vec<String>) -> Self {
        assert!(
            !models.is_empty(),
            "ModelRotator requires at least one model"
        );
        Self {
            models,
            cooldowns: HashMap::new(),
            current_index: 0,
        }
    }

    /// Get next available model (skip models still in cooldown).
    pub fn next_available(&mut self) -> &str {
        self.purge_expired();
        let total = self.models.len();

        for _ in 0..total {
            let index = self.current_index % total;
            self.current_index = (self.current_index + 1) % total;
            let model = &self.models[index];
            if !self.in_cooldown(model) {
                return model;
            }
        }

        &self.models[self.current_index % total]
    }

    /// Peek next available model without advancing rotation index.
    pub fn peek_next_available(&mut self) -> &str {
        self.purge_expired();
        let total = self.models.len();
        let start_index = self.current_index % total;

        for offset in 0..total {
            let index = (start_index + offset) % total;
            let model = &self.models[index];
            if !self.in_cooldown(model) {
                return model;
            }
        }

        &self.models[start_index]
    }

    /// Mark a model as exhausted with cooldown duration.
    pub fn mark_exhausted(&mut self, model: &str, cooldown: Duration) {
        self.cooldowns
            .insert(model.to_string(), Instant::now() + cooldown);
    }

    /// Check if all models are in cooldown.
    pub fn all_exhausted(&self) -> bool {
        let now = Instant::now();
        self.models.iter().all(|model| {
            self.cooldowns
                .get(model)
                .is_some_and(|cooldown_until| *cooldown_until > now)
        })
    }

    fn in_cooldown(&self, model: &str) -> bool {
        let now = Instant::now();
        self.cooldowns
            .get(model)
            .is_some_and(|cooldown_until| *cooldown_until > now)
    }

    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.cooldowns.retain(|_, until| *until > now);
    }
}

fn is_rate_or_quota_error(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }

    let body_lower = body.to_ascii_lowercase();
    body_lower.contains("rate_limit")
        || body_lower.contains("quota")
        || body_lower.contains("insufficient_quota")
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let retry_at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    let now = Utc::now();
    let seconds = (retry_at - now).num_seconds().max(0) as u64;
    Some(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_model_rotator_basic() {
        let mut rotator = ModelRotator::new(vec!["gpt-a".to_string(), "gpt-b".to_string()]);
        assert_eq!(rotator.next_available(), "gpt-a");
    }

    #[test]
    fn test_model_rotator_failover() {
        let mut rotator = ModelRotator::new(vec!["gpt-a".to_string(), "gpt-b".to_string()]);
        let first = rotator.next_available().to_string();
        rotator.mark_exhausted(&first, Duration::from_secs(60));
        assert_eq!(rotator.next_available(), "gpt-b");
    }

    #[test]
    fn test_model_rotator_cooldown_expiry() {
        let mut rotator = ModelRotator::new(vec!["gpt-a".to_string(), "gpt-b".to_string()]);
        rotator.mark_exhausted("gpt-a", Duration::from_secs(0));
        assert_eq!(rotator.next_available(), "gpt-a");
    }

    #[test]
    fn test_model_rotator_all_exhausted() {
        let mut rotator = ModelRotator::new(vec!["gpt-a".to_string(), "gpt-b".to_string()]);
        rotator.mark_exhausted("gpt-a", Duration::from_secs(60));
        rotator.mark_exhausted("gpt-b", Duration::from_secs(60));
        assert!(rotator.all_exhausted());
    }

    #[test]
    fn test_retry_after_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("120"));

        let retry_after = parse_retry_after(&headers);
        assert_eq!(retry_after, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_parse_final_turn() {
        let response = json!({
            "choices": [{"message": {"content": "Saved to people."}}]
        });
        let turn = parse_model_turn(&response).unwrap();
        assert!(matches!(turn, ModelTurn::Final(text) if text == "Saved to people."));
    }

    #[test]
    fn test_parse_tool_call_turn_with_string_arguments() {
        let response = json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "function": {
                        "name": "search_entries",
                        "arguments": "{\"query\": \"ballbox\"}"
                    }
                }]
            }}]
        });
        let turn = parse_model_turn(&response).unwrap();
        match turn {
            ModelTurn::ToolCalls(requests) => {
                assert_eq!(requests.len(), 1);
                assert_eq!(requests[0].name, "search_entries");
                assert_eq!(requests[0].arguments["query"], "ballbox");
            }
            ModelTurn::Final(_) => panic!("expected tool calls"),
        }
    }

    #[test]
    fn test_parse_rejects_empty_message() {
        let response = json!({"choices": [{"message": {"content": null}}]});
        assert!(parse_model_turn(&response).is_err());
    }

    #[test]
    fn test_tool_role_is_replayed_as_user_content() {
        let wire = to_wire_message(&ModelMessage {
            role: Role::Tool,
            content: "{\"success\":true}".to_string(),
        });
        assert_eq!(wire["role"], "user");
        assert!(wire["content"].as_str().unwrap().starts_with("[tool results]"));
    }

    #[test]
    fn test_api_client_requires_a_model() {
        assert!(ApiClient::new("http://localhost:4000/v1", "key", " , ").is_err());
        assert!(ApiClient::new("http://localhost:4000/v1", "key", "gpt-a").is_ok());
    }
}
