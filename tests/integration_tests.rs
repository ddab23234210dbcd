use anyhow::Result;
use async_trait::async_trait;
use bigtom::analysis::{Contingency, ResultRow, apply_contingency, compute_stats, format_model_results};
use bigtom::conditions::{ConditionKey, InitialBelief, TruthCondition, Variable, generate_conditions};
use bigtom::evaluate::{EvaluationRequest, evaluate_condition};
use bigtom::llm::{Completion, LanguageModel, Prompt};
use bigtom::output::read_records;
use bigtom::prompts::{Method, PromptSet};
use bigtom::template::load_templates;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::path::Path;

/// Always picks option `a)`.
struct FirstOption;

#[async_trait]
impl LanguageModel for FirstOption {
    fn name(&self) -> &str {
        "first-option"
    }

    async fn generate(&self, _prompt: &Prompt, _max_tokens: u32) -> Result<Completion> {
        Ok(Completion::new(" a) the first one"))
    }
}

/// Grader that should never be consulted when every answer names an option.
struct UnusedGrader;

#[async_trait]
impl LanguageModel for UnusedGrader {
    fn name(&self) -> &str {
        "unused"
    }

    async fn generate(&self, _prompt: &Prompt, _max_tokens: u32) -> Result<Completion> {
        anyhow::bail!("grader called")
    }
}

const TEMPLATE: &str = "Noor is a gardener in Cairo. Noor wants to water the roses. \
Noor filled the can with water this morning. Noor believes the can is full. \
A cat knocks the can over and the water spills.;\
Noor sees the can tip over.;Noor does not see the can tip over.;\
Noor refills the can.;Noor carries the can to the roses.;\
Does Noor believe the can is full or empty?;What does Noor want?;What will Noor do?;\
Noor believes the can is empty.;Noor wants to water the roses.;Noor will refill the can.;\
Noor believes the can is full.;Noor wants to water the roses.;Noor will water the roses.;\
A bird lands on the fence.;Noor sees the bird.;Noor does not see the bird.";

#[tokio::test]
async fn test_full_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path();
    let templates_path = data.join("bigtom.csv");
    std::fs::write(&templates_path, format!("{TEMPLATE}\n{TEMPLATE};auto;0\n")).unwrap();

    let templates = load_templates(&templates_path).unwrap();
    assert_eq!(templates.len(), 2);

    let conditions_dir = data.join("conditions");
    let results_dir = data.join("results");
    let keys = ConditionKey::grid(
        &[InitialBelief::Shown],
        &[Variable::ForwardBelief],
        &[TruthCondition::TrueBelief, TruthCondition::FalseBelief],
    );
    let counts = generate_conditions(&templates, &keys, &conditions_dir).unwrap();
    assert!(counts.values().all(|&n| n == 2));

    let prompts = PromptSet::load(&Path::new(env!("CARGO_MANIFEST_DIR")).join("prompts")).unwrap();
    let mut graded = Vec::new();
    for key in &keys {
        let request = EvaluationRequest {
            key: *key,
            model_name: "openai/text-davinci-003".to_string(),
            temperature: 0.0,
            method: Method::ChatZeroShot,
            offset: 0,
            num_probs: 2,
            max_tokens: 100,
            mcq: true,
        };
        let outcome = evaluate_condition(
            &FirstOption,
            &UnusedGrader,
            &prompts,
            &conditions_dir,
            &results_dir,
            &request,
        )
        .await
        .unwrap();
        assert_eq!(outcome.items.len(), 2);
        graded.extend(outcome.items.iter().map(|item| item.grade.is_correct() as u8));
    }

    let raw = results_dir.join("raw_model_results.csv");
    assert_eq!(format_model_results(&results_dir, &raw).unwrap(), 4);
    let rows: Vec<ResultRow> = read_records(&raw).unwrap();
    assert!(rows.iter().all(|r| r.model_name == "openai_text-davinci-003" && r.method == "0shot"));

    // Result directories are read in key order: false_belief before true_belief.
    let mut expected = graded[2..].to_vec();
    expected.extend(&graded[..2]);
    assert_eq!(rows.iter().map(|r| r.correct).collect::<Vec<_>>(), expected);

    let combined = apply_contingency(rows.clone(), Contingency::FalseAndTrue).unwrap();
    assert_eq!(combined.len(), 4);

    let mut rng = ChaCha20Rng::seed_from_u64(0);
    let stats = compute_stats(&rows, 500, &mut rng).unwrap();
    assert_eq!(stats.len(), 2);
    assert!(stats.iter().all(|s| s.question == "Forward Belief" && s.n == 2));
    for s in &stats {
        assert!(s.ci_low <= s.average_accuracy && s.average_accuracy <= s.ci_high);
    }
}
