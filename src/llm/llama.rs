use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;

use super::{Completion, LanguageModel, Prompt, Usage};
use crate::fetch::{HttpClient, json_request, send_json};

/// A LLaMA checkpoint behind a llama.cpp server (`POST /completion`).
/// Chat prompts are flattened to text.
pub struct LlamaServerModel<C> {
    client: C,
    base_url: String,
    model: String,
    temperature: f64,
}

impl<C: HttpClient> LlamaServerModel<C> {
    pub fn new(client: C, base_url: &str, model: &str, temperature: f64) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
        }
    }
}

#[async_trait]
impl<C: HttpClient> LanguageModel for LlamaServerModel<C> {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt, max_tokens: u32) -> Result<Completion> {
        let body = json!({
            "prompt": prompt.flatten(),
            "n_predict": max_tokens,
            "temperature": self.temperature,
            "stop": prompt.stop(),
            "cache_prompt": true,
        });

        let url = format!("{}/completion", self.base_url);
        let json: serde_json::Value =
            send_json(&self.client, json_request(Method::POST, &url, &body)?).await?;

        let text = json["content"]
            .as_str()
            .ok_or_else(|| anyhow!("Invalid response format: no content"))?;
        Ok(Completion {
            text: text.to_string(),
            usage: Usage {
                prompt_tokens: json["tokens_evaluated"].as_u64().unwrap_or(0),
                completion_tokens: json["tokens_predicted"].as_u64().unwrap_or(0),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::RecordingClient;

    #[tokio::test]
    async fn test_completion_request() {
        let model = LlamaServerModel::new(
            RecordingClient::ok(r#"{"content": " a)", "tokens_evaluated": 300, "tokens_predicted": 2}"#),
            "http://127.0.0.1:8080/",
            "llama-13",
            0.7,
        );
        let out = model.generate(&Prompt::text("Story: s", &["Story:"]), 100).await.unwrap();
        assert_eq!(out.text, " a)");
        assert_eq!(out.usage.prompt_tokens, 300);

        let seen = model.client.last();
        assert_eq!(seen.url.as_str(), "http://127.0.0.1:8080/completion");
        let body = seen.json();
        assert_eq!(body["prompt"], "Story: s");
        assert_eq!(body["n_predict"], 100);
        assert_eq!(body["stop"][0], "Story:");
    }
}
