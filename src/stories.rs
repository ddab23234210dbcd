//! Few-shot generation of new story templates with a chat model.
//!
//! Every round re-reads the template file so stories written in earlier
//! rounds can serve as examples in later ones.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use rand::Rng;
use rand::seq::SliceRandom;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::llm::{ChatMessage, LanguageModel, Prompt, Usage};
use crate::template::{COLUMNS, StoryTemplate, load_templates};

/// How each template column is labelled in a story completion, in
/// [`COLUMNS`] order.
pub const LABELS: [&str; 17] = [
    "Story",
    "Aware of event",
    "Not aware of event",
    "Action given new state",
    "Action given initial state",
    "Belief Question",
    "Desire Question",
    "Action Question",
    "Belief Aware",
    "Desire Aware",
    "Action Aware",
    "Belief not Aware",
    "Desire not Aware",
    "Action not Aware",
    "Random Event",
    "Aware of random event",
    "Not aware of random event",
];

const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Trailing columns marking a template as machine-written.
const GENERATED_MARKER: [&str; 2] = ["auto", "0"];

/// USD per thousand prompt and completion tokens.
const PROMPT_PRICE: f64 = 0.03;
const COMPLETION_PRICE: f64 = 0.06;

#[derive(Debug, Clone, Copy)]
pub struct StoryRequest {
    pub num_stories: usize,
    pub num_shots: usize,
    pub max_tokens: u32,
}

impl Default for StoryRequest {
    fn default() -> Self {
        Self { num_stories: 1, num_shots: 3, max_tokens: 450 }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoryReport {
    pub written: usize,
    pub skipped: usize,
    pub usage: Usage,
}

impl StoryReport {
    pub fn price(&self) -> f64 {
        (self.usage.prompt_tokens as f64 * PROMPT_PRICE
            + self.usage.completion_tokens as f64 * COMPLETION_PRICE)
            / 1000.0
    }
}

/// Renders a template the way the model is asked to answer.
pub fn format_example(template: &StoryTemplate) -> String {
    let mut out = String::from("Here is the story:");
    for (label, value) in LABELS.iter().zip(template.to_row()) {
        out.push('\n');
        out.push_str(label);
        out.push_str(": ");
        out.push_str(value);
    }
    out
}

/// Reads `Label: value` lines of a completion back into a template.
pub fn parse_story(text: &str) -> Result<StoryTemplate> {
    let mut values: [Option<&str>; 17] = [None; 17];
    for line in text.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        if let Some(i) = LABELS.iter().position(|l| *l == label.trim()) {
            values[i] = Some(value.trim());
        }
    }
    StoryTemplate::from_pairs(
        COLUMNS
            .iter()
            .zip(values)
            .filter_map(|(column, value)| value.map(|v| (*column, v))),
    )
}

fn story_prompt<R: Rng + ?Sized>(
    instruction: &str,
    examples: &[StoryTemplate],
    rng: &mut R,
) -> Prompt {
    let mut messages = vec![ChatMessage::system(instruction)];
    for example in examples {
        messages.push(ChatMessage::user("Generate a story"));
        messages.push(ChatMessage::assistant(format_example(example)));
    }
    let letter = LETTERS
        .chars()
        .nth(rng.gen_range(0..LETTERS.len()))
        .unwrap_or('A');
    messages.push(ChatMessage::user(format!(
        "Generate another story, using a different context, object states, and names than the examples did. The name must start with {letter}."
    )));
    Prompt::chat(messages)
}

fn append_template(path: &Path, template: &StoryTemplate) -> Result<()> {
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut writer = WriterBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_writer(file);

    let mut row = template.to_row();
    row.extend(GENERATED_MARKER);
    writer.write_record(&row)?;
    writer.flush()?;
    Ok(())
}

/// Asks `model` for `request.num_stories` new stories, appending each one
/// that parses to `template_csv`.
#[tracing::instrument(skip_all, fields(model = model.name(), template_csv = %template_csv.display()))]
pub async fn generate_stories<R: Rng + ?Sized>(
    model: &dyn LanguageModel,
    instruction: &str,
    template_csv: &Path,
    request: &StoryRequest,
    rng: &mut R,
) -> Result<StoryReport> {
    let mut report = StoryReport::default();

    for n in 0..request.num_stories {
        let mut examples = load_templates(template_csv)?;
        debug!(examples = examples.len(), "Example pool read");
        examples.shuffle(rng);
        examples.truncate(request.num_shots);

        let prompt = story_prompt(instruction, &examples, rng);
        let completion = model.generate(&prompt, request.max_tokens).await?;
        report.usage.add(completion.usage);
        info!(
            story = n + 1,
            price_usd = %format!("{:.2}", report.price()),
            per_story_usd = %format!("{:.2}", report.price() / (n + 1) as f64),
            "Story generated"
        );

        match parse_story(&completion.text) {
            Ok(template) => {
                append_template(template_csv, &template)?;
                report.written += 1;
            }
            Err(e) => {
                warn!(story = n + 1, error = %e, "Skipping malformed story");
                debug!(text = %completion.text, "Malformed story text");
                report.skipped += 1;
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::llm::testing::ScriptedModel;
    use crate::template::tests::kofi;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_format_then_parse() {
        let text = format_example(&kofi());
        assert!(text.starts_with("Here is the story:\nStory: Kofi"));
        assert_eq!(parse_story(&text).unwrap(), kofi());
    }

    #[test]
    fn test_parse_reports_missing_labels() {
        let err = parse_story("Story: a\nBelief Question: b").unwrap_err();
        assert!(err.to_string().contains("aware_of_event"));
    }

    #[tokio::test]
    async fn test_generate_appends_parsed_stories() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("bigtom.csv");
        append_template(&csv, &kofi()).unwrap();

        let mut generated = kofi();
        generated.story = "Lena is a baker.".to_string();
        let reply = format_example(&generated);
        let model = ScriptedModel::new(&[reply.as_str(), "I cannot do that."]);

        let request = StoryRequest { num_stories: 2, num_shots: 3, max_tokens: 450 };
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let report = generate_stories(&model, "Write stories.", &csv, &request, &mut rng)
            .await
            .unwrap();
        assert_eq!((report.written, report.skipped), (1, 1));

        let templates = load_templates(&csv).unwrap();
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[1].story, "Lena is a baker.");
        assert!(std::fs::read_to_string(&csv).unwrap().trim_end().ends_with(";auto;0"));

        // The second round could use the first generated story as an example.
        let calls = model.calls.lock().unwrap();
        let messages = calls[1].0.messages();
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages.len(), 1 + 2 * 2 + 1);
        assert!(messages.last().unwrap().content.contains("The name must start with"));
    }
}
