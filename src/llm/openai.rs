use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;

use super::{Completion, LanguageModel, Prompt, Usage};
use crate::fetch::{HttpClient, json_request, send_json};

/// OpenAI chat completions (`gpt-4`, `gpt-3.5-turbo`). Text prompts are sent
/// as a single user message. The bearer key comes from an
/// [`ApiKey`](crate::fetch::auth::ApiKey) wrapper around `client`.
pub struct OpenAiChatModel<C> {
    client: C,
    base_url: String,
    model: String,
    temperature: f64,
}

impl<C: HttpClient> OpenAiChatModel<C> {
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
impl<C: HttpClient> LanguageModel for OpenAiChatModel<C> {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt, max_tokens: u32) -> Result<Completion> {
        let mut body = json!({
            "model": self.model,
            "messages": prompt.messages(),
            "temperature": self.temperature,
            "max_tokens": max_tokens,
            "n": 1,
        });
        if !prompt.stop().is_empty() {
            body["stop"] = json!(prompt.stop());
        }

        let url = format!("{}/v1/chat/completions", self.base_url);
        let json: serde_json::Value =
            send_json(&self.client, json_request(Method::POST, &url, &body)?).await?;

        let text = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("Invalid response format: no message content"))?;
        Ok(Completion {
            text: text.to_string(),
            usage: Usage {
                prompt_tokens: json["usage"]["prompt_tokens"].as_u64().unwrap_or(0),
                completion_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::RecordingClient;
    use crate::llm::ChatMessage;

    const REPLY: &str = r#"{
        "choices": [{"message": {"role": "assistant", "content": "Answer: a)"}}],
        "usage": {"prompt_tokens": 120, "completion_tokens": 4}
    }"#;

    #[tokio::test]
    async fn test_chat_request_and_reply() {
        let model = OpenAiChatModel::new(RecordingClient::ok(REPLY), "https://api.openai.com", "gpt-4", 0.0);
        let prompt = Prompt::chat(vec![ChatMessage::system("sys"), ChatMessage::user("Story: s")]);
        let out = model.generate(&prompt, 100).await.unwrap();

        assert_eq!(out.text, "Answer: a)");
        assert_eq!(out.usage.prompt_tokens, 120);
        assert_eq!(out.usage.completion_tokens, 4);

        let seen = model.client.last();
        assert_eq!(seen.url.as_str(), "https://api.openai.com/v1/chat/completions");
        let body = seen.json();
        assert_eq!(body["model"], "gpt-4");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["max_tokens"], 100);
        assert!(body.get("stop").is_none());
    }

    #[tokio::test]
    async fn test_text_prompt_becomes_user_message_with_stops() {
        let model = OpenAiChatModel::new(RecordingClient::ok(REPLY), "https://api.openai.com/", "gpt-3.5-turbo", 0.5);
        model
            .generate(&Prompt::text("Story: s\nAnswer:", &["Story:"]), 30)
            .await
            .unwrap();

        let body = model.client.last().json();
        assert_eq!(body["messages"][0]["content"], "Story: s\nAnswer:");
        assert_eq!(body["stop"][0], "Story:");
        assert_eq!(body["temperature"], 0.5);
    }

    #[tokio::test]
    async fn test_missing_content_is_an_error() {
        let model = OpenAiChatModel::new(RecordingClient::ok(r#"{"choices": []}"#), "http://x", "gpt-4", 0.0);
        assert!(model.generate(&Prompt::text("q", &[]), 10).await.is_err());
    }
}
