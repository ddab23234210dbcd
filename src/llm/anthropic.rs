use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::HeaderValue;
use serde_json::json;

use super::{Completion, LanguageModel, Prompt, Role};
use crate::fetch::{HttpClient, json_request, send_json};

const HUMAN: &str = "\n\nHuman:";
const ASSISTANT: &str = "\n\nAssistant:";

/// Claude models on the text completion API (`claude-v1.3`,
/// `claude-instant-v1.1`). The `x-api-key` header comes from an
/// [`ApiKey`](crate::fetch::auth::ApiKey) wrapper around `client`.
pub struct AnthropicModel<C> {
    client: C,
    base_url: String,
    model: String,
    temperature: f64,
}

impl<C: HttpClient> AnthropicModel<C> {
    pub fn new(client: C, base_url: &str, model: &str, temperature: f64) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
        }
    }
}

/// Renders a prompt in Human/Assistant turns, ending on an open assistant
/// turn. System text is passed as an admin-tagged human turn.
fn render(prompt: &Prompt) -> String {
    let mut text = String::new();
    for message in prompt.messages() {
        match message.role {
            Role::System => text.push_str(&format!("{HUMAN} <admin>{}</admin>", message.content)),
            Role::User => text.push_str(&format!("{HUMAN} {}", message.content)),
            Role::Assistant => text.push_str(&format!("{ASSISTANT} {}", message.content)),
        }
    }
    text.push_str(ASSISTANT);
    text
}

#[async_trait]
impl<C: HttpClient> LanguageModel for AnthropicModel<C> {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt, max_tokens: u32) -> Result<Completion> {
        let mut stop: Vec<&str> = vec![HUMAN];
        stop.extend(prompt.stop().iter().map(String::as_str));

        let body = json!({
            "model": self.model,
            "prompt": render(prompt),
            "max_tokens_to_sample": max_tokens,
            "temperature": self.temperature,
            "stop_sequences": stop,
        });

        let url = format!("{}/v1/complete", self.base_url);
        let mut req = json_request(Method::POST, &url, &body)?;
        req.headers_mut()
            .insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        let json: serde_json::Value = send_json(&self.client, req).await?;

        json["completion"]
            .as_str()
            .map(Completion::new)
            .ok_or_else(|| anyhow!("Invalid response format: no completion"))
    }
}
