//! Evaluation methods and the prompts they send.
//!
//! Instruction texts live in a prompt directory so they can be edited
//! without rebuilding; the story/question framing and the one-shot example
//! are fixed here.

use anyhow::{Context, Result, anyhow, bail};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::llm::{ChatMessage, Prompt};

pub const ONE_SHOT_STORY: &str = "Kofi is a fisherman from a small village in Ghana. He wants to catch enough fish today to provide for his family and sell the surplus at the market. Kofi repaired his fishing net last night. While Kofi is away from his boat, a group of monkeys comes and plays with the fishing net, tearing it apart. Kofi does not see the monkeys damaging his fishing net.";
pub const ONE_SHOT_QUESTION: &str = "Does Kofi believe his fishing net is in good condition or torn apart?\nChoose one of the following:\na)Kofi believes his fishing net is in good condition.\nb)Kofi believes his fishing net is torn apart.";
pub const ONE_SHOT_ANSWER: &str = "a)Kofi believes his fishing net is in good condition.";
pub const ONE_SHOT_THOUGHT: &str = "Let's think step by step:\n1) Kofi repaired his fishing net last night. So last night he believes that his net is fixed.\n2) While Kofi is away from his boat, a group of monkeys comes and plays with the fishing net, tearing it apart.\n3) Kofi does not see the monkeys damaging his fishing net. So, his belief about his net stays the same. He thinks that it is fixed.\n4) Does Kofi believe his fishing net is in good condition or torn apart?\n5) Kofi believes his fishing net is in good condition.";

/// Appended to a chain-of-thought to ask for the final option.
pub const COT_ANSWER_SUFFIX: &str = "\nWrite the answer as <option>) <answer>\nAnswer:";
pub const COT_THOUGHT_TOKENS: u32 = 200;
pub const COT_ANSWER_TOKENS: u32 = 30;

const STOP: [&str; 2] = ["Story:", "Question:"];
const STOP_COT: [&str; 3] = ["Story:", "Question:", "Answer:"];
const STOP_GRADE: [&str; 3] = ["Predicted Answer:", "True Answer:", "Response:"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    ZeroShot,
    OneShot,
    ZeroShotCot,
    OneShotCot,
    ChatZeroShot,
    ChatOneShot,
    ChatZeroShotCot,
    ChatOneShotCot,
    /// Grading of another model's answer.
    Eval,
}

impl Method {
    pub const ALL: [Method; 9] = [
        Method::ZeroShot,
        Method::OneShot,
        Method::ZeroShotCot,
        Method::OneShotCot,
        Method::ChatZeroShot,
        Method::ChatOneShot,
        Method::ChatZeroShotCot,
        Method::ChatOneShotCot,
        Method::Eval,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::ZeroShot => "0shot",
            Method::OneShot => "1shot",
            Method::ZeroShotCot => "0shot-cot",
            Method::OneShotCot => "1shot-cot",
            Method::ChatZeroShot => "chat-0shot",
            Method::ChatOneShot => "chat-1shot",
            Method::ChatZeroShotCot => "chat-0shot-cot",
            Method::ChatOneShotCot => "chat-1shot-cot",
            Method::Eval => "eval",
        }
    }

    pub fn is_chat(&self) -> bool {
        matches!(
            self,
            Method::ChatZeroShot | Method::ChatOneShot | Method::ChatZeroShotCot | Method::ChatOneShotCot
        )
    }

    pub fn is_cot(&self) -> bool {
        matches!(
            self,
            Method::ZeroShotCot | Method::OneShotCot | Method::ChatZeroShotCot | Method::ChatOneShotCot
        )
    }

    pub fn is_one_shot(&self) -> bool {
        matches!(
            self,
            Method::OneShot | Method::OneShotCot | Method::ChatOneShot | Method::ChatOneShotCot
        )
    }

    /// Name without the `chat-` prefix, as results tables report it.
    pub fn base_name(&self) -> &'static str {
        let name = self.as_str();
        name.strip_prefix("chat-").unwrap_or(name)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| anyhow!("method {s} not supported"))
    }
}

/// Instruction texts read from the prompt directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub evaluate: String,
    pub evaluate_cot: String,
    pub evaluate_cot_chat: String,
    pub grade: String,
}

fn read_prompt(dir: &Path, name: &str) -> Result<String> {
    let path = dir.join(name);
    std::fs::read_to_string(&path).with_context(|| format!("reading prompt {}", path.display()))
}

impl PromptSet {
    pub fn load(dir: &Path) -> Result<Self> {
        Ok(Self {
            evaluate: read_prompt(dir, "evaluate.txt")?,
            evaluate_cot: read_prompt(dir, "evaluate_cot.txt")?,
            evaluate_cot_chat: read_prompt(dir, "evaluate_cot_chat.txt")?,
            grade: read_prompt(dir, "grade.txt")?,
        })
    }

    pub fn instruction(&self, method: Method) -> &str {
        match method {
            Method::ZeroShot | Method::OneShot | Method::ChatZeroShot | Method::ChatOneShot => {
                &self.evaluate
            }
            Method::ZeroShotCot | Method::OneShotCot => &self.evaluate_cot,
            Method::ChatZeroShotCot | Method::ChatOneShotCot => &self.evaluate_cot_chat,
            Method::Eval => &self.grade,
        }
    }

    /// The prompt that asks `method` to answer `question` about `story`.
    /// For chain-of-thought completion methods this is the thought prompt;
    /// the answer prompt extends it with [`COT_ANSWER_SUFFIX`].
    pub fn question_prompt(&self, method: Method, story: &str, question: &str) -> Result<Prompt> {
        let instruction = self.instruction(method);
        let prompt = match method {
            Method::ZeroShot => Prompt::text(
                format!("{instruction}\n\nStory: {story}\nQuestion: {question}\nAnswer:"),
                &STOP,
            ),
            Method::OneShot => {
                let one_shot = format!(
                    "Story: {ONE_SHOT_STORY}\nQuestion: {ONE_SHOT_QUESTION}\nAnswer: {ONE_SHOT_ANSWER}"
                );
                Prompt::text(
                    format!("{instruction}\n{one_shot}\n\n\nStory: {story}\nQuestion: {question}\nAnswer:"),
                    &STOP,
                )
            }
            Method::ZeroShotCot => Prompt::text(
                format!("{instruction}\n\nStory: {story}\nQuestion: {question}\nThought: Let's think step by step:"),
                &STOP_COT,
            ),
            Method::OneShotCot => {
                let one_shot = format!(
                    "Story: {ONE_SHOT_STORY}\nQuestion: {ONE_SHOT_QUESTION}\nThought: {ONE_SHOT_THOUGHT}{COT_ANSWER_SUFFIX} {ONE_SHOT_ANSWER}"
                );
                Prompt::text(
                    format!("{instruction}\n{one_shot}\n\n\nStory: {story}\nQuestion: {question}\nThought: Let's think step by step:"),
                    &STOP_COT,
                )
            }
            Method::ChatZeroShot | Method::ChatOneShot | Method::ChatZeroShotCot | Method::ChatOneShotCot => {
                let mut messages = vec![ChatMessage::system(instruction)];
                if method.is_one_shot() {
                    messages.push(ChatMessage::user(format!(
                        "Story: {ONE_SHOT_STORY}\nQuestion: {ONE_SHOT_QUESTION}"
                    )));
                    messages.push(ChatMessage::assistant(if method.is_cot() {
                        format!("Thought: {ONE_SHOT_THOUGHT}\nAnswer: {ONE_SHOT_ANSWER}")
                    } else {
                        format!("Answer: {ONE_SHOT_ANSWER}")
                    }));
                }
                messages.push(ChatMessage::user(format!("Story: {story}\nQuestion: {question}")));
                Prompt::chat(messages)
            }
            Method::Eval => bail!("method eval grades answers and cannot answer questions"),
        };
        Ok(prompt)
    }

    /// Asks the grader whether `predicted` is closer to `true_answer` than
    /// to `wrong_answer`.
    pub fn grading_prompt(&self, query: &str, true_answer: &str, wrong_answer: &str, predicted: &str) -> Prompt {
        Prompt::text(
            format!(
                "{}\n\nHere is the question:\n{query}\nHere is the true answer:\n{true_answer}\nHere is the false answer:\n{wrong_answer}\nHere is the predicted answer:\n{predicted}\nIs the predicted answer close to the true answer compared to the false answer? Answer True or False.\nA:",
                self.grade
            ),
            &STOP_GRADE,
        )
    }
}

/// Extracts the final answer from a chat chain-of-thought reply: the text
/// after the first `Answer:` marker, or the whole reply when there is none.
pub fn parse_chat_response(response: &str) -> &str {
    match response.find("Answer:") {
        Some(idx) => response[idx + "Answer:".len()..].trim(),
        None => response.trim(),
    }
}
