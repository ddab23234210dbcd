//! Language model backends.
//!
//! Every backend implements [`LanguageModel`]: it takes a [`Prompt`] (raw
//! completion text or a chat transcript) and returns the generated text.
//! [`from_model_name`] picks the backend from a model name the way the
//! evaluation CLI accepts them.

mod anthropic;
mod crfm;
mod llama;
mod openai;
mod retry;
mod router;

pub use anthropic::AnthropicModel;
pub use crfm::CrfmModel;
pub use llama::LlamaServerModel;
pub use openai::OpenAiChatModel;
pub use retry::{RetryPolicy, Retrying};
pub use router::{Backend, from_model_name, grader_from_model_name};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// What gets sent to a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    Text { text: String, stop: Vec<String> },
    Chat { messages: Vec<ChatMessage>, stop: Vec<String> },
}

impl Prompt {
    pub fn text(text: impl Into<String>, stop: &[&str]) -> Self {
        Prompt::Text {
            text: text.into(),
            stop: stop.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn chat(messages: Vec<ChatMessage>) -> Self {
        Prompt::Chat { messages, stop: Vec::new() }
    }

    pub fn stop(&self) -> &[String] {
        match self {
            Prompt::Text { stop, .. } | Prompt::Chat { stop, .. } => stop,
        }
    }

    /// The prompt as a message list; plain text becomes a single user turn.
    pub fn messages(&self) -> Vec<ChatMessage> {
        match self {
            Prompt::Text { text, .. } => vec![ChatMessage::user(text.clone())],
            Prompt::Chat { messages, .. } => messages.clone(),
        }
    }

    /// The prompt as plain text for completion-only backends. Chat turns are
    /// rendered `Role: content`, one blank line apart.
    pub fn flatten(&self) -> String {
        match self {
            Prompt::Text { text, .. } => text.clone(),
            Prompt::Chat { messages, .. } => messages
                .iter()
                .map(|m| {
                    let role = m.role.as_str();
                    let mut label = role[..1].to_uppercase();
                    label.push_str(&role[1..]);
                    format!("{label}: {}", m.content)
                })
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl Usage {
    pub fn add(&mut self, other: Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

impl Completion {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), usage: Usage::default() }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model name as given on the command line.
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &Prompt, max_tokens: u32) -> Result<Completion>;
}

#[async_trait]
impl<M: LanguageModel + ?Sized> LanguageModel for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn generate(&self, prompt: &Prompt, max_tokens: u32) -> Result<Completion> {
        (**self).generate(prompt, max_tokens).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies from a fixed script and records each call. An empty script
    /// answers with the empty string.
    pub(crate) struct ScriptedModel {
        name: String,
        replies: Mutex<VecDeque<Result<String>>>,
        pub calls: Mutex<Vec<(Prompt, u32)>>,
    }

    impl ScriptedModel {
        pub fn new(replies: &[&str]) -> Self {
            Self {
                name: "scripted".to_string(),
                replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing_then(failures: usize, reply: &str) -> Self {
            let mut replies: VecDeque<Result<String>> =
                (0..failures).map(|i| Err(anyhow::anyhow!("transient failure {i}"))).collect();
            replies.push_back(Ok(reply.to_string()));
            Self {
                name: "scripted".to_string(),
                replies: Mutex::new(replies),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(&self, prompt: &Prompt, max_tokens: u32) -> Result<Completion> {
            self.calls.lock().unwrap().push((prompt.clone(), max_tokens));
            let reply = self.replies.lock().unwrap().pop_front();
            match reply {
                Some(Ok(text)) => Ok(Completion::new(text)),
                Some(Err(e)) => Err(e),
                None => Ok(Completion::new("")),
            }
        }
    }
}
