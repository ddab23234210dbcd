use anyhow::{Result, ensure};
use chrono::Utc;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::grader::{AnswerKey, Grade, LlmGrader};
use super::predictor::Predictor;
use crate::conditions::{ConditionKey, load_condition_rows, stories_path};
use crate::llm::LanguageModel;
use crate::output::{append_record, write_lines};
use crate::prompts::{Method, PromptSet, parse_chat_response};

pub const SUMMARY_FILE: &str = "summary.csv";

/// One evaluation run: a model answering the items of one condition.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub key: ConditionKey,
    pub model_name: String,
    pub temperature: f64,
    pub method: Method,
    /// First row evaluated.
    pub offset: usize,
    /// End (exclusive) of the rows evaluated.
    pub num_probs: usize,
    pub max_tokens: u32,
    /// Present the two answers as options `a)`/`b)`.
    pub mcq: bool,
}

impl EvaluationRequest {
    /// File name stem shared by the prediction and accuracy files.
    pub fn file_stem(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}_{}_{}",
            self.model_name.replace('/', "_"),
            format_temperature(self.temperature),
            self.method,
            self.key.variable,
            self.key.condition,
            self.offset,
            self.num_probs
        )
    }

    pub fn prediction_path(&self, results_dir: &Path) -> PathBuf {
        self.key
            .dir(results_dir)
            .join(format!("prediction_{}.csv", self.file_stem()))
    }

    pub fn accuracy_path(&self, results_dir: &Path) -> PathBuf {
        self.key
            .dir(results_dir)
            .join(format!("accuracy_{}.csv", self.file_stem()))
    }
}

/// `0.0`, `0.7`, `1.0`: whole temperatures keep one decimal.
pub fn format_temperature(temperature: f64) -> String {
    if temperature.fract() == 0.0 {
        format!("{temperature:.1}")
    } else {
        format!("{temperature}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemResult {
    pub story: String,
    /// Question as asked, options included for multiple choice.
    pub question: String,
    /// True and wrong answers, prefixed with their option labels.
    pub true_answer: String,
    pub wrong_answer: String,
    pub predicted: String,
    pub grade: Grade,
}

#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub items: Vec<ItemResult>,
    pub accuracy: f64,
    pub prediction_path: PathBuf,
    pub accuracy_path: PathBuf,
}

/// Row appended to `results/summary.csv` after every run.
#[derive(Debug, Serialize)]
pub struct EvaluationSummary {
    pub timestamp: String,
    pub model: String,
    pub temperature: f64,
    pub method: String,
    pub condition: String,
    pub offset: usize,
    pub num_probs: usize,
    pub items: usize,
    pub accuracy: f64,
}

/// Share of `True` grades; 0 for no items.
pub fn accuracy(grades: &[Grade]) -> f64 {
    if grades.is_empty() {
        return 0.0;
    }
    grades.iter().filter(|g| g.is_correct()).count() as f64 / grades.len() as f64
}

/// Evaluates `model` on rows `[offset, num_probs)` of a condition and
/// writes the prediction and accuracy files under `results_dir`.
#[tracing::instrument(
    skip(model, grader, prompts, conditions_dir, results_dir, request),
    fields(model = %request.model_name, method = %request.method, condition = %request.key)
)]
pub async fn evaluate_condition(
    model: &dyn LanguageModel,
    grader: &dyn LanguageModel,
    prompts: &PromptSet,
    conditions_dir: &Path,
    results_dir: &Path,
    request: &EvaluationRequest,
) -> Result<EvaluationOutcome> {
    ensure!(request.method != Method::Eval, "method eval cannot be evaluated");

    let rows = load_condition_rows(&stories_path(conditions_dir, &request.key))?;
    let end = request.num_probs.min(rows.len());
    let start = request.offset.min(end);
    if end < request.num_probs {
        debug!(available = rows.len(), requested = request.num_probs, "Fewer rows than requested");
    }

    let predictor = Predictor::new(model, prompts, request.method, request.max_tokens);
    let llm_grader = LlmGrader::new(grader, prompts);
    let mut rng = ChaCha20Rng::seed_from_u64(0);
    let mut items = Vec::with_capacity(end - start);

    for (i, row) in rows[start..end].iter().enumerate() {
        let mut answers = [row.correct_answer.as_str(), row.incorrect_answer.as_str()];
        answers.shuffle(&mut rng);
        let true_first = answers[0] == row.correct_answer;

        let question = if request.mcq {
            format!(
                "{}\nChoose one of the following:\na){}\nb){}",
                row.question, answers[0], answers[1]
            )
        } else {
            row.question.clone()
        };

        let predicted = predictor.predict(&row.story, &question).await?.trim().to_string();

        let key = AnswerKey::new(true_first);
        let true_answer = format!("{} {}", key.correct, row.correct_answer);
        let wrong_answer = format!("{} {}", key.incorrect, row.incorrect_answer);

        let parsed = if request.method == Method::ChatZeroShotCot {
            parse_chat_response(&predicted)
        } else {
            predicted.as_str()
        };

        let matched = if request.mcq { key.match_option(parsed) } else { None };
        let grade = match matched {
            Some(grade) => grade,
            None => {
                llm_grader
                    .grade(&row.question, parsed, &true_answer, &wrong_answer)
                    .await?
            }
        };

        debug!(item = start + i, predicted = %predicted, %grade, "Item graded");
        items.push(ItemResult {
            story: row.story.clone(),
            question,
            true_answer,
            wrong_answer,
            predicted,
            grade,
        });
    }

    let prediction_path = request.prediction_path(results_dir);
    let accuracy_path = request.accuracy_path(results_dir);
    let predictions: Vec<&str> = items.iter().map(|r| r.predicted.as_str()).collect();
    let grades: Vec<Grade> = items.iter().map(|r| r.grade).collect();
    write_lines(&prediction_path, &predictions)?;
    write_lines(&accuracy_path, &grades.iter().map(Grade::as_str).collect::<Vec<_>>())?;

    let accuracy = accuracy(&grades);
    if items.is_empty() {
        warn!(offset = request.offset, num_probs = request.num_probs, "No items evaluated");
    }
    info!(
        items = items.len(),
        accuracy = %format!("{:.2}%", accuracy * 100.0),
        "Evaluation finished"
    );

    append_record(
        &results_dir.join(SUMMARY_FILE),
        &EvaluationSummary {
            timestamp: Utc::now().to_rfc3339(),
            model: request.model_name.clone(),
            temperature: request.temperature,
            method: request.method.to_string(),
            condition: request.key.to_string(),
            offset: request.offset,
            num_probs: request.num_probs,
            items: items.len(),
            accuracy,
        },
    )?;

    Ok(EvaluationOutcome {
        items,
        accuracy,
        prediction_path,
        accuracy_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{InitialBelief, TruthCondition, Variable, generate_conditions};
    use crate::llm::testing::ScriptedModel;
    use crate::output::read_lines;
    use crate::prompts::tests::prompt_set;
    use crate::template::tests::kofi;

    fn request(method: Method, mcq: bool) -> EvaluationRequest {
        EvaluationRequest {
            key: ConditionKey::new(InitialBelief::Shown, Variable::ForwardBelief, TruthCondition::FalseBelief),
            model_name: "openai/text-davinci-003".to_string(),
            temperature: 0.0,
            method,
            offset: 0,
            num_probs: 1,
            max_tokens: 100,
            mcq,
        }
    }

    fn setup(req: &EvaluationRequest) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        generate_conditions(&[kofi()], &[req.key], &dir.path().join("conditions")).unwrap();
        dir
    }

    /// Whether the seeded shuffle puts the true answer first for item 0.
    fn first_key() -> AnswerKey {
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let mut order = [0, 1];
        order.shuffle(&mut rng);
        AnswerKey::new(order[0] == 0)
    }

    #[test]
    fn test_file_names() {
        let mut req = request(Method::ChatZeroShot, true);
        req.offset = 100;
        req.num_probs = 200;
        let path = req.accuracy_path(Path::new("results"));
        assert_eq!(
            path,
            PathBuf::from(
                "results/1_forward_belief_false_belief/accuracy_openai_text-davinci-003_0.0_chat-0shot_forward_belief_false_belief_100_200.csv"
            )
        );
        req.temperature = 0.7;
        assert!(req.file_stem().contains("_0.7_"));
    }

    #[test]
    fn test_accuracy_of_no_items_is_zero() {
        assert_eq!(accuracy(&[]), 0.0);
        assert_eq!(accuracy(&[Grade::True, Grade::False]), 0.5);
    }

    #[tokio::test]
    async fn test_mcq_answer_with_key_is_graded_without_grader() {
        let req = request(Method::ZeroShot, true);
        let dir = setup(&req);
        let key = first_key();

        let reply = format!(" {} Kofi believes his net is torn.", key.correct);
        let model = ScriptedModel::new(&[reply.as_str()]);
        let grader = ScriptedModel::new(&[]);
        let outcome = evaluate_condition(
            &model,
            &grader,
            &prompt_set(),
            &dir.path().join("conditions"),
            &dir.path().join("results"),
            &req,
        )
        .await
        .unwrap();

        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].grade, Grade::True);
        assert_eq!(outcome.accuracy, 1.0);
        assert_eq!(grader.call_count(), 0);
        assert!(outcome.items[0].question.contains("\nChoose one of the following:\na)"));
        assert!(outcome.items[0].true_answer.starts_with(key.correct));

        assert_eq!(read_lines(&outcome.accuracy_path).unwrap(), vec!["True"]);
        let predictions = read_lines(&outcome.prediction_path).unwrap();
        assert!(predictions[0].starts_with(key.correct));
        assert!(dir.path().join("results/summary.csv").exists());
    }

    #[tokio::test]
    async fn test_unlabelled_answer_goes_to_grader() {
        let req = request(Method::ZeroShot, true);
        let dir = setup(&req);

        let model = ScriptedModel::new(&["Kofi thinks the net is broken."]);
        let grader = ScriptedModel::new(&[" False"]);
        let outcome = evaluate_condition(
            &model,
            &grader,
            &prompt_set(),
            &dir.path().join("conditions"),
            &dir.path().join("results"),
            &req,
        )
        .await
        .unwrap();

        assert_eq!(grader.call_count(), 1);
        assert_eq!(outcome.items[0].grade, Grade::False);
        assert_eq!(outcome.accuracy, 0.0);
    }

    #[tokio::test]
    async fn test_chat_cot_reply_is_parsed_before_matching() {
        let req = request(Method::ChatZeroShotCot, true);
        let dir = setup(&req);
        let key = first_key();

        let reply = format!("Thought: he saw {} nothing.\nAnswer: {} torn", key.correct, key.incorrect);
        let model = ScriptedModel::new(&[reply.as_str()]);
        let grader = ScriptedModel::new(&[]);
        let outcome = evaluate_condition(
            &model,
            &grader,
            &prompt_set(),
            &dir.path().join("conditions"),
            &dir.path().join("results"),
            &req,
        )
        .await
        .unwrap();

        assert_eq!(outcome.items[0].grade, Grade::False);
        assert_eq!(grader.call_count(), 0);
    }

    #[tokio::test]
    async fn test_free_text_mode_always_uses_grader() {
        let req = request(Method::ZeroShot, false);
        let dir = setup(&req);

        let model = ScriptedModel::new(&["a) torn"]);
        let grader = ScriptedModel::new(&["True"]);
        let outcome = evaluate_condition(
            &model,
            &grader,
            &prompt_set(),
            &dir.path().join("conditions"),
            &dir.path().join("results"),
            &req,
        )
        .await
        .unwrap();

        assert_eq!(grader.call_count(), 1);
        assert_eq!(outcome.items[0].grade, Grade::True);
        assert!(!outcome.items[0].question.contains("Choose one"));
    }

    #[tokio::test]
    async fn test_offset_past_end_evaluates_nothing() {
        let mut req = request(Method::ZeroShot, true);
        req.offset = 5;
        req.num_probs = 10;
        let dir = setup(&req);

        let model = ScriptedModel::new(&[]);
        let grader = ScriptedModel::new(&[]);
        let outcome = evaluate_condition(
            &model,
            &grader,
            &prompt_set(),
            &dir.path().join("conditions"),
            &dir.path().join("results"),
            &req,
        )
        .await
        .unwrap();

        assert!(outcome.items.is_empty());
        assert_eq!(outcome.accuracy, 0.0);
        assert_eq!(model.call_count(), 0);
    }
}
