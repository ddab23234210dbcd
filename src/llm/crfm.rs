use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::{Method, Request};
use serde::{Deserialize, Serialize};

use super::{ChatMessage, Completion, LanguageModel, Prompt, Usage};
use crate::fetch::{HttpClient, send_json};

/// Completion (and chat) models served through the CRFM/HELM proxy.
///
/// The proxy takes the request as a JSON-encoded `request` query parameter
/// on `GET {base}/api/request`; the `auth` parameter is added by the
/// [`UrlParam`](crate::fetch::auth::UrlParam) wrapper around `client`.
pub struct CrfmModel<C> {
    client: C,
    base_url: String,
    model: String,
    temperature: f64,
}

#[derive(Serialize)]
struct HelmRequest<'a> {
    model: &'a str,
    model_deployment: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    messages: Option<Vec<ChatMessage>>,
    temperature: f64,
    max_tokens: u32,
    top_p: f64,
    frequency_penalty: f64,
    presence_penalty: f64,
    num_completions: u32,
    top_k_per_token: u32,
    stop_sequences: &'a [String],
    echo_prompt: bool,
}

#[derive(Deserialize)]
struct HelmResult {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    completions: Vec<HelmCompletion>,
}

#[derive(Deserialize)]
struct HelmCompletion {
    text: String,
    #[serde(default)]
    tokens: Vec<serde_json::Value>,
}

impl<C: HttpClient> CrfmModel<C> {
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
impl<C: HttpClient> LanguageModel for CrfmModel<C> {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt, max_tokens: u32) -> Result<Completion> {
        let (text, messages) = match prompt {
            Prompt::Text { text, .. } => (Some(text.as_str()), None),
            Prompt::Chat { messages, .. } => (None, Some(messages.clone())),
        };
        let request = HelmRequest {
            model: &self.model,
            model_deployment: &self.model,
            prompt: text,
            messages,
            temperature: self.temperature,
            max_tokens,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            num_completions: 1,
            top_k_per_token: 1,
            stop_sequences: prompt.stop(),
            echo_prompt: false,
        };

        let mut url = reqwest::Url::parse(&format!("{}/api/request", self.base_url))
            .with_context(|| format!("bad CRFM base URL {}", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("request", &serde_json::to_string(&request)?);

        let result: HelmResult = send_json(&self.client, Request::new(Method::GET, url)).await?;
        if !result.success {
            bail!(
                "CRFM request failed: {}",
                result.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }

        let completion = result
            .completions
            .into_iter()
            .next()
            .context("CRFM returned no completions")?;
        Ok(Completion {
            usage: Usage {
                prompt_tokens: 0,
                completion_tokens: completion.tokens.len() as u64,
            },
            text: completion.text,
        })
    }
}
