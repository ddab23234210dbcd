use anyhow::Result;
use tracing::debug;

use crate::llm::{LanguageModel, Prompt};
use crate::prompts::{COT_ANSWER_SUFFIX, COT_ANSWER_TOKENS, COT_THOUGHT_TOKENS, Method, PromptSet};

/// Gets a model's answer to one story question under an evaluation method.
pub struct Predictor<'a> {
    model: &'a dyn LanguageModel,
    prompts: &'a PromptSet,
    method: Method,
    max_tokens: u32,
}

impl<'a> Predictor<'a> {
    pub fn new(model: &'a dyn LanguageModel, prompts: &'a PromptSet, method: Method, max_tokens: u32) -> Self {
        Self {
            model,
            prompts,
            method,
            max_tokens,
        }
    }

    /// Returns the raw (untrimmed) answer. Chain-of-thought completion
    /// methods take two calls: the thought, then the option.
    pub async fn predict(&self, story: &str, question: &str) -> Result<String> {
        let prompt = self.prompts.question_prompt(self.method, story, question)?;

        if self.method.is_chat() || !self.method.is_cot() {
            return Ok(self.model.generate(&prompt, self.max_tokens).await?.text);
        }

        let thought = self.model.generate(&prompt, COT_THOUGHT_TOKENS).await?.text;
        debug!(thought = %thought.trim(), "Chain of thought");

        let answer_prompt = match prompt {
            Prompt::Text { text, stop } => Prompt::Text {
                text: format!("{text}{thought}{COT_ANSWER_SUFFIX}"),
                stop,
            },
            chat @ Prompt::Chat { .. } => chat,
        };
        Ok(self.model.generate(&answer_prompt, COT_ANSWER_TOKENS).await?.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::prompts::tests::prompt_set;

    #[tokio::test]
    async fn test_single_call_methods() {
        let prompts = prompt_set();
        for method in [Method::ZeroShot, Method::OneShot, Method::ChatZeroShotCot] {
            let model = ScriptedModel::new(&[" a)"]);
            let answer = Predictor::new(&model, &prompts, method, 100)
                .predict("S.", "Q?")
                .await
                .unwrap();
            assert_eq!(answer, " a)");
            let calls = model.calls.lock().unwrap();
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].1, 100);
        }
    }

    #[tokio::test]
    async fn test_cot_takes_thought_then_answer() {
        let prompts = prompt_set();
        let model = ScriptedModel::new(&[" He did not see it.", " b) torn"]);
        let answer = Predictor::new(&model, &prompts, Method::ZeroShotCot, 100)
            .predict("S.", "Q?")
            .await
            .unwrap();
        assert_eq!(answer, " b) torn");

        let calls = model.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, COT_THOUGHT_TOKENS);
        assert_eq!(calls[1].1, COT_ANSWER_TOKENS);
        assert!(calls[1].0.flatten().ends_with(
            "Thought: Let's think step by step: He did not see it.\nWrite the answer as <option>) <answer>\nAnswer:"
        ));
        assert_eq!(calls[1].0.stop().len(), 3);
    }
}
