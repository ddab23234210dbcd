use anyhow::{Context, Result, bail};
use tracing::debug;

use super::{
    AnthropicModel, CrfmModel, LanguageModel, LlamaServerModel, OpenAiChatModel, Retrying,
};
use crate::config::Settings;
use crate::fetch::BasicClient;
use crate::fetch::auth::{ApiKey, UrlParam};

const LLAMA_SIZES: [u32; 4] = [65, 33, 13, 7];

/// Which API serves a model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Crfm,
    Llama { size: u32 },
    OpenAi,
    Anthropic,
}

impl Backend {
    pub fn detect(model_name: &str) -> Result<Backend> {
        if model_name.contains("openai") {
            return Ok(Backend::Crfm);
        }
        if model_name.contains("llama") {
            return LLAMA_SIZES
                .into_iter()
                .find(|size| model_name.contains(&format!("llama-{size}")))
                .map(|size| Backend::Llama { size })
                .with_context(|| format!("Model {model_name} not supported"));
        }
        match model_name {
            "gpt-4" | "gpt-3.5-turbo" => Ok(Backend::OpenAi),
            "claude-v1.3" | "claude-instant-v1.1" => Ok(Backend::Anthropic),
            _ => bail!("Model {model_name} not supported"),
        }
    }
}

fn required<'a>(value: &'a Option<String>, var: &str) -> Result<&'a str> {
    value
        .as_deref()
        .with_context(|| format!("{var} must be set"))
}

fn crfm(model_name: &str, temperature: f64, settings: &Settings) -> Result<Box<dyn LanguageModel>> {
    let key = required(&settings.crfm_api_key, "CRFM_API_KEY")?;
    let client = UrlParam {
        inner: BasicClient::with_timeout(settings.request_timeout)?,
        param_name: "auth".to_string(),
        key: serde_json::json!({ "api_key": key }).to_string(),
    };
    let model = CrfmModel::new(client, &settings.crfm_url, model_name, temperature);
    Ok(Box::new(Retrying::new(model, settings.retry_policy())))
}

/// Builds the model to evaluate, with retries.
pub fn from_model_name(
    model_name: &str,
    temperature: f64,
    settings: &Settings,
) -> Result<Box<dyn LanguageModel>> {
    let backend = Backend::detect(model_name)?;
    debug!(model = model_name, ?backend, "Model backend selected");
    let policy = settings.retry_policy();

    let model: Box<dyn LanguageModel> = match backend {
        Backend::Crfm => return crfm(model_name, temperature, settings),
        Backend::Llama { .. } => {
            let client = BasicClient::with_timeout(settings.request_timeout)?;
            Box::new(Retrying::new(
                LlamaServerModel::new(client, &settings.llama_url, model_name, temperature),
                policy,
            ))
        }
        Backend::OpenAi => {
            let key = required(&settings.openai_api_key, "OPENAI_API_KEY")?;
            let client = ApiKey::bearer(BasicClient::with_timeout(settings.request_timeout)?, key)?;
            Box::new(Retrying::new(
                OpenAiChatModel::new(client, &settings.openai_url, model_name, temperature),
                policy,
            ))
        }
        Backend::Anthropic => {
            let key = required(&settings.anthropic_api_key, "ANTHROPIC_API_KEY")?;
            let client = ApiKey::new(
                BasicClient::with_timeout(settings.request_timeout)?,
                "x-api-key",
                key,
            )?;
            Box::new(Retrying::new(
                AnthropicModel::new(client, &settings.anthropic_url, model_name, temperature),
                policy,
            ))
        }
    };
    Ok(model)
}

/// Builds the grading model. Grading always runs on a CRFM `openai/*`
/// completion model at temperature 0.
pub fn grader_from_model_name(model_name: &str, settings: &Settings) -> Result<Box<dyn LanguageModel>> {
    if Backend::detect(model_name).ok() != Some(Backend::Crfm) {
        bail!("grading model {model_name} must be a CRFM openai/* model");
    }
    crfm(model_name, 0.0, settings)
}
