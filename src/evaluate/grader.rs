use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::llm::LanguageModel;
use crate::prompts::PromptSet;

/// Tokens the grading model may use for its verdict.
pub const GRADER_MAX_TOKENS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    True,
    False,
}

impl Grade {
    pub fn from_correct(correct: bool) -> Self {
        if correct { Grade::True } else { Grade::False }
    }

    pub fn is_correct(&self) -> bool {
        *self == Grade::True
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::True => "True",
            Grade::False => "False",
        }
    }

    /// Reads a grader reply. Anything starting with "true" (any case) is
    /// correct; everything else is not.
    pub fn from_reply(reply: &str) -> Self {
        Grade::from_correct(reply.trim().to_lowercase().starts_with("true"))
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Grade {
    type Err = anyhow::Error;

    /// Strict parse of a stored grade (`True`/`False`, `1`/`0`).
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "True" | "true" | "1" => Ok(Grade::True),
            "False" | "false" | "0" => Ok(Grade::False),
            other => bail!("'{other}' is not a grade"),
        }
    }
}

/// The option labels of a two-way multiple-choice item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerKey {
    pub correct: &'static str,
    pub incorrect: &'static str,
}

impl AnswerKey {
    /// Key for an item whose true answer was shuffled into first place or not.
    pub fn new(true_answer_first: bool) -> Self {
        if true_answer_first {
            Self { correct: "a)", incorrect: "b)" }
        } else {
            Self { correct: "b)", incorrect: "a)" }
        }
    }

    /// Grades an answer by the option label it mentions; the correct label
    /// wins when both appear. `None` when neither does.
    pub fn match_option(&self, answer: &str) -> Option<Grade> {
        let answer = answer.to_lowercase();
        if answer.contains(self.correct) {
            Some(Grade::True)
        } else if answer.contains(self.incorrect) {
            Some(Grade::False)
        } else {
            None
        }
    }
}

/// Asks a language model whether a free-text answer matches the true one.
pub struct LlmGrader<'a> {
    model: &'a dyn LanguageModel,
    prompts: &'a PromptSet,
}

impl<'a> LlmGrader<'a> {
    pub fn new(model: &'a dyn LanguageModel, prompts: &'a PromptSet) -> Self {
        Self { model, prompts }
    }

    pub async fn grade(
        &self,
        query: &str,
        predicted: &str,
        true_answer: &str,
        wrong_answer: &str,
    ) -> Result<Grade> {
        let prompt = self
            .prompts
            .grading_prompt(query, true_answer, wrong_answer, predicted);
        let reply = self.model.generate(&prompt, GRADER_MAX_TOKENS).await?;
        let grade = Grade::from_reply(&reply.text);
        debug!(grader = self.model.name(), reply = %reply.text.trim(), %grade, "Graded by model");
        Ok(grade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedModel;
    use crate::prompts::tests::prompt_set;

    #[test]
    fn test_answer_key_follows_shuffle() {
        assert_eq!(AnswerKey::new(true).correct, "a)");
        assert_eq!(AnswerKey::new(false).correct, "b)");
        assert_eq!(AnswerKey::new(false).incorrect, "a)");
    }

    #[test]
    fn test_match_option() {
        let key = AnswerKey::new(true);
        assert_eq!(key.match_option("a) Kofi believes his net is fine."), Some(Grade::True));
        assert_eq!(key.match_option("A) Kofi"), Some(Grade::True));
        assert_eq!(key.match_option("b)Kofi believes it is torn."), Some(Grade::False));
        assert_eq!(key.match_option("Kofi believes it is fine."), None);
    }

    #[test]
    fn test_grade_parsing() {
        assert_eq!(Grade::from_reply(" True."), Grade::True);
        assert_eq!(Grade::from_reply("TRUE"), Grade::True);
        assert_eq!(Grade::from_reply("False"), Grade::False);
        assert_eq!(Grade::from_reply("Maybe"), Grade::False);
        assert_eq!("1".parse::<Grade>().unwrap(), Grade::True);
        assert_eq!("False".parse::<Grade>().unwrap(), Grade::False);
        assert!("maybe".parse::<Grade>().is_err());
    }

    #[tokio::test]
    async fn test_llm_grader_uses_ten_tokens() {
        let model = ScriptedModel::new(&[" True"]);
        let prompts = prompt_set();
        let grader = LlmGrader::new(&model, &prompts);

        let grade = grader.grade("Q?", "the net is fine", "a) fine", "b) torn").await.unwrap();
        assert_eq!(grade, Grade::True);

        let calls = model.calls.lock().unwrap();
        assert_eq!(calls[0].1, GRADER_MAX_TOKENS);
        assert!(calls[0].0.flatten().contains("Here is the predicted answer:\nthe net is fine"));
    }
}
