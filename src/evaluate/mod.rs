//! Evaluating a language model on generated conditions.
//!
//! The [`Predictor`] asks the model each question under an evaluation
//! method; answers are graded by the option label they mention and, when
//! that is inconclusive, by an [`LlmGrader`].

pub mod driver;
pub mod grader;
pub mod predictor;

pub use driver::{
    EvaluationOutcome, EvaluationRequest, EvaluationSummary, ItemResult, evaluate_condition,
    format_temperature,
};
pub use grader::{AnswerKey, Grade, LlmGrader};
pub use predictor::Predictor;
