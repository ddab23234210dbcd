//! Sampling two-option tasks for the Prolific experiments.
//!
//! Condition rows of a true and a false cell are stitched so that each
//! task offers its own correct answer next to the answer that is correct in
//! the other cell. Experiment 1 mixes these with expert and crowd-sourced
//! items for rating; experiment 2 asks participants to answer them.

use anyhow::{Context, Result, ensure};
use csv::ReaderBuilder;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::conditions::{
    ConditionKey, ConditionRow, InitialBelief, TruthCondition, Variable, load_condition_rows,
    stories_path,
};
use crate::output::{read_json, write_json};

pub const CORRECT_MARKER: &str = " (Correct Answer)";

pub const EXP1_CONDITIONS: usize = 5;
pub const EXP1_EXPERT_PER_CONDITION: usize = 5;
pub const EXP1_CROWD_PER_CONDITION: usize = 5;
pub const EXP1_TRUE_PER_CONDITION: usize = 10;
pub const EXP1_FALSE_PER_CONDITION: usize = 10;

/// A story, its question, and candidate answers with the correct one first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSource {
    pub story: String,
    pub question: String,
    pub answers: Vec<String>,
}

impl TaskSource {
    fn has_identical_answers(&self) -> bool {
        matches!(self.answers.as_slice(), [a, b, ..] if a == b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub story: String,
    pub question: String,
    pub answers: Vec<String>,
    pub data_source: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers_no_label: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_labels: Option<Vec<u8>>,
}

/// Pairs row `i` of a true cell with row `i` of its false counterpart. The
/// second answer of each output row is the other cell's correct answer.
pub fn stitch(
    true_rows: &[ConditionRow],
    false_rows: &[ConditionRow],
) -> Result<(Vec<TaskSource>, Vec<TaskSource>)> {
    ensure!(
        true_rows.len() == false_rows.len(),
        "true and false conditions differ in length ({} vs {})",
        true_rows.len(),
        false_rows.len()
    );

    Ok(true_rows
        .iter()
        .zip(false_rows)
        .map(|(t, f)| {
            (
                TaskSource {
                    story: t.story.clone(),
                    question: t.question.clone(),
                    answers: vec![t.correct_answer.clone(), f.correct_answer.clone()],
                },
                TaskSource {
                    story: f.story.clone(),
                    question: f.question.clone(),
                    answers: vec![f.correct_answer.clone(), t.correct_answer.clone()],
                },
            )
        })
        .unzip())
}

/// Marks the first answer as correct, shuffles the answers and numbers the
/// tasks by their position in `sources`.
pub fn to_tasks<R: Rng + ?Sized>(
    sources: &[TaskSource],
    data_source: &str,
    skip_identical: bool,
    rng: &mut R,
) -> Vec<Task> {
    let mut tasks = Vec::with_capacity(sources.len());
    for (i, source) in sources.iter().enumerate() {
        if skip_identical && source.has_identical_answers() {
            debug!(data_source, index = i, "Skipping item with identical answers");
            continue;
        }
        let mut answers = source.answers.clone();
        if let Some(correct) = answers.first_mut() {
            correct.push_str(CORRECT_MARKER);
        }
        answers.shuffle(rng);
        tasks.push(Task {
            story: source.story.clone(),
            question: source.question.clone(),
            answers,
            data_source: data_source.to_string(),
            id: format!("{data_source}_{i:02}"),
            answers_no_label: None,
            true_labels: None,
        });
    }
    tasks
}

/// Strips the correct-answer marker into `answers_no_label` and records
/// which answers carried it in `true_labels`.
pub fn label_mcq(tasks: &mut [Task]) {
    for task in tasks {
        let (answers, labels): (Vec<String>, Vec<u8>) = task
            .answers
            .iter()
            .map(|answer| {
                if answer.contains(CORRECT_MARKER.trim_start()) {
                    (answer.replace(CORRECT_MARKER, ""), 1)
                } else {
                    (answer.clone(), 0)
                }
            })
            .unzip();
        task.answers_no_label = Some(answers);
        task.true_labels = Some(labels);
    }
}

/// Reads a headerless `story;question;answer;...` file of hand-written items.
pub fn load_sources(path: &Path) -> Result<Vec<TaskSource>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut sources = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("{} row {}", path.display(), i + 1))?;
        ensure!(record.len() >= 3, "{} row {} has no answers", path.display(), i + 1);
        sources.push(TaskSource {
            story: record[0].to_string(),
            question: record[1].to_string(),
            answers: record.iter().skip(2).map(str::to_string).collect(),
        });
    }
    Ok(sources)
}

fn load_stitched(
    conditions_dir: &Path,
    variable: Variable,
) -> Result<(Vec<TaskSource>, Vec<TaskSource>)> {
    let key = |condition| ConditionKey::new(InitialBelief::Shown, variable, condition);
    let true_rows = load_condition_rows(&stories_path(conditions_dir, &key(TruthCondition::TrueBelief)))?;
    let false_rows = load_condition_rows(&stories_path(conditions_dir, &key(TruthCondition::FalseBelief)))?;
    stitch(&true_rows, &false_rows).with_context(|| format!("stitching {variable}"))
}

/// Shuffles several equally indexed lists with one shared permutation,
/// truncating them to the shortest.
fn shuffle_jointly<T: Clone, R: Rng + ?Sized>(lists: &mut [Vec<T>], rng: &mut R) {
    let len = lists.iter().map(Vec::len).min().unwrap_or(0);
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(rng);
    for list in lists.iter_mut() {
        *list = order.iter().map(|&i| list[i].clone()).collect();
    }
}

fn window<T: Clone>(items: &[T], start: usize, len: usize) -> Vec<T> {
    let out: Vec<T> = items.iter().skip(start).take(len).cloned().collect();
    if out.len() < len {
        warn!(wanted = len, got = out.len(), start, "Not enough items to fill a window");
    }
    out
}

fn take_sources(path: &Path, limit: usize) -> Result<Vec<TaskSource>> {
    let mut sources = load_sources(path)?;
    sources.truncate(limit);
    Ok(sources)
}

/// Builds the experiment 1 condition files: each mixes expert items, crowd
/// items, and true- and false-belief items, in shuffled order.
///
/// Reads `expert_data/{ullman,dodell-feder,kosinski}.csv`,
/// `social_iqa/social_iqa.csv` and the forward-belief cells under
/// `conditions/` in `data_dir`.
#[tracing::instrument(skip_all, fields(data_dir = %data_dir.display()))]
pub fn sample_exp1<R: Rng + ?Sized>(data_dir: &Path, rng: &mut R) -> Result<Vec<Vec<Task>>> {
    let expert_dir = data_dir.join("expert_data");
    let mut expert = to_tasks(&take_sources(&expert_dir.join("ullman.csv"), 8)?, "ullman", false, rng);
    expert.extend(to_tasks(&take_sources(&expert_dir.join("dodell-feder.csv"), 8)?, "dodell", false, rng));
    expert.extend(to_tasks(&take_sources(&expert_dir.join("kosinski.csv"), 9)?, "kosinski", false, rng));

    let crowd = take_sources(&data_dir.join("social_iqa").join("social_iqa.csv"), 25)?;
    let crowd = to_tasks(&crowd, "social_iqa", false, rng);

    let (true_belief, false_belief) = load_stitched(&data_dir.join("conditions"), Variable::ForwardBelief)?;
    let mut halves = [true_belief, false_belief];
    shuffle_jointly(&mut halves, rng);
    let [true_belief, false_belief] = halves;

    // Disjoint story windows so no participant sees both versions of a story.
    let true_count = EXP1_TRUE_PER_CONDITION * EXP1_CONDITIONS;
    let false_count = EXP1_FALSE_PER_CONDITION * EXP1_CONDITIONS;
    let true_belief = to_tasks(&window(&true_belief, 0, true_count), "true_belief", false, rng);
    let false_belief = to_tasks(&window(&false_belief, false_count, false_count), "false_belief", false, rng);

    let mut conditions = Vec::with_capacity(EXP1_CONDITIONS);
    for i in 0..EXP1_CONDITIONS {
        let mut tasks = window(&expert, i * EXP1_EXPERT_PER_CONDITION, EXP1_EXPERT_PER_CONDITION);
        tasks.extend(window(&crowd, i * EXP1_CROWD_PER_CONDITION, EXP1_CROWD_PER_CONDITION));
        tasks.extend(window(&true_belief, i * EXP1_TRUE_PER_CONDITION, EXP1_TRUE_PER_CONDITION));
        tasks.extend(window(&false_belief, i * EXP1_FALSE_PER_CONDITION, EXP1_FALSE_PER_CONDITION));
        tasks.shuffle(rng);
        info!(condition = i, tasks = tasks.len(), "Experiment 1 condition sampled");
        conditions.push(tasks);
    }
    Ok(conditions)
}

/// How many stories of one variable go into experiment 2, per truth value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exp2Quota {
    pub variable: Variable,
    /// Stories drawn before items with identical answers are dropped.
    pub sampled: usize,
    /// Tasks kept after dropping.
    pub kept: usize,
}

pub const EXP2_QUOTAS: [Exp2Quota; 4] = [
    Exp2Quota { variable: Variable::ForwardBelief, sampled: 5, kept: 5 },
    Exp2Quota { variable: Variable::BackwardBelief, sampled: 5, kept: 5 },
    Exp2Quota { variable: Variable::ForwardAction, sampled: 5, kept: 5 },
    Exp2Quota { variable: Variable::BackwardDesire, sampled: 20, kept: 5 },
];

/// Builds the single experiment 2 condition from the shown-initial-belief
/// true/false cells of every quota variable under `conditions_dir`.
#[tracing::instrument(skip_all, fields(conditions_dir = %conditions_dir.display()))]
pub fn sample_exp2<R: Rng + ?Sized>(
    conditions_dir: &Path,
    quotas: &[Exp2Quota],
    rng: &mut R,
) -> Result<Vec<Task>> {
    // Lists in order: every variable's true half, then every false half.
    let mut lists = Vec::with_capacity(quotas.len() * 2);
    let mut false_halves = Vec::with_capacity(quotas.len());
    for quota in quotas {
        let (true_half, false_half) = load_stitched(conditions_dir, quota.variable)?;
        lists.push(true_half);
        false_halves.push(false_half);
    }
    lists.extend(false_halves);
    shuffle_jointly(&mut lists, rng);

    let mut tasks = Vec::new();
    for (i, sources) in lists.iter().enumerate() {
        let quota = quotas[i % quotas.len()];
        let truth = if i < quotas.len() { "true" } else { "false" };
        let data_source = format!("{}_{truth}", quota.variable);
        let sampled = window(sources, 0, quota.sampled);
        let mut converted = to_tasks(&sampled, &data_source, true, rng);
        if converted.len() < quota.kept {
            warn!(%data_source, kept = converted.len(), wanted = quota.kept, "Too few distinct items");
        }
        converted.truncate(quota.kept);
        tasks.extend(converted);
    }
    tasks.shuffle(rng);
    info!(tasks = tasks.len(), "Experiment 2 condition sampled");
    Ok(tasks)
}

/// Writes `condition_{i}.json` per condition into `out_dir`.
pub fn write_condition_files(out_dir: &Path, conditions: &[Vec<Task>]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::with_capacity(conditions.len());
    for (i, tasks) in conditions.iter().enumerate() {
        let path = out_dir.join(format!("condition_{i}.json"));
        write_json(&path, tasks)?;
        paths.push(path);
    }
    Ok(paths)
}

/// Labels every `condition_{i}.json` in `dir`, writing `condition_{i}_mcq.json`
/// beside it. Returns the written paths.
#[tracing::instrument(skip_all, fields(dir = %dir.display()))]
pub fn label_mcq_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut inputs: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading directory {}", dir.display()))?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("condition_") && n.ends_with(".json") && !n.ends_with("_mcq.json"))
        })
        .collect();
    inputs.sort();

    let mut written = Vec::with_capacity(inputs.len());
    for input in inputs {
        let mut tasks: Vec<Task> = read_json(&input)?;
        label_mcq(&mut tasks);
        let out = input.with_file_name(format!(
            "{}_mcq.json",
            input.file_stem().and_then(|s| s.to_str()).unwrap_or("condition")
        ));
        write_json(&out, &tasks)?;
        info!(input = %input.display(), tasks = tasks.len(), "MCQ labels written");
        written.push(out);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use std::io::Write;

    fn row(story: &str, correct: &str, incorrect: &str) -> ConditionRow {
        ConditionRow {
            story: story.to_string(),
            question: "Q?".to_string(),
            correct_answer: correct.to_string(),
            incorrect_answer: incorrect.to_string(),
        }
    }

    fn write_cell(conditions_dir: &Path, variable: Variable, condition: TruthCondition, rows: &[ConditionRow]) {
        let key = ConditionKey::new(InitialBelief::Shown, variable, condition);
        let path = stories_path(conditions_dir, &key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut writer = csv::WriterBuilder::new().delimiter(b';').has_headers(false).from_path(&path).unwrap();
        for r in rows {
            writer.serialize(r).unwrap();
        }
        writer.flush().unwrap();
    }

    fn write_pair(conditions_dir: &Path, variable: Variable, n: usize, identical_every: Option<usize>) {
        let true_rows: Vec<_> = (0..n).map(|i| row(&format!("t{i}"), &format!("yes {i}"), "no")).collect();
        let false_rows: Vec<_> = (0..n)
            .map(|i| {
                let correct = match identical_every {
                    Some(k) if i % k == 0 => format!("yes {i}"),
                    _ => format!("no {i}"),
                };
                row(&format!("f{i}"), &correct, "yes")
            })
            .collect();
        write_cell(conditions_dir, variable, TruthCondition::TrueBelief, &true_rows);
        write_cell(conditions_dir, variable, TruthCondition::FalseBelief, &false_rows);
    }

    #[test]
    fn test_stitch_takes_other_cells_answer() {
        let (t, f) = stitch(&[row("a", "A1", "A2")], &[row("b", "B1", "B2")]).unwrap();
        assert_eq!(t[0].answers, vec!["A1", "B1"]);
        assert_eq!(f[0].answers, vec!["B1", "A1"]);
        assert_eq!(f[0].story, "b");
        assert!(stitch(&[row("a", "A1", "A2")], &[]).is_err());
    }

    #[test]
    fn test_to_tasks_marks_and_numbers() {
        let sources = vec![
            TaskSource { story: "s0".into(), question: "q".into(), answers: vec!["x".into(), "x".into()] },
            TaskSource { story: "s1".into(), question: "q".into(), answers: vec!["x".into(), "y".into()] },
        ];
        let mut rng = ChaCha20Rng::seed_from_u64(0);

        let tasks = to_tasks(&sources, "forward_belief_true", true, &mut rng);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "forward_belief_true_01");
        assert!(tasks[0].answers.contains(&"x (Correct Answer)".to_string()));
        assert!(tasks[0].answers.contains(&"y".to_string()));

        assert_eq!(to_tasks(&sources, "ullman", false, &mut rng).len(), 2);
    }

    #[test]
    fn test_label_mcq() {
        let mut tasks = vec![Task {
            story: "s".into(),
            question: "q".into(),
            answers: vec!["b".into(), "a (Correct Answer)".into()],
            data_source: "x".into(),
            id: "x_00".into(),
            answers_no_label: None,
            true_labels: None,
        }];
        label_mcq(&mut tasks);
        assert_eq!(tasks[0].answers_no_label.as_deref(), Some(&["b".to_string(), "a".to_string()][..]));
        assert_eq!(tasks[0].true_labels, Some(vec![0, 1]));
    }

    #[test]
    fn test_sample_exp2_quotas() {
        let dir = tempfile::tempdir().unwrap();
        for quota in EXP2_QUOTAS {
            let identical = (quota.variable == Variable::BackwardDesire).then_some(2);
            write_pair(dir.path(), quota.variable, 30, identical);
        }

        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let tasks = sample_exp2(dir.path(), &EXP2_QUOTAS, &mut rng).unwrap();
        assert_eq!(tasks.len(), 40);
        for source in ["backward_desire_true", "backward_desire_false", "forward_action_false"] {
            assert_eq!(tasks.iter().filter(|t| t.data_source == source).count(), 5, "{source}");
        }
        let stripped = |a: &str| a.replace(CORRECT_MARKER, "");
        assert!(tasks.iter().all(|t| stripped(&t.answers[0]) != stripped(&t.answers[1])));
    }

    #[test]
    fn test_sample_exp1_and_label_files() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path();
        write_pair(&data.join("conditions"), Variable::ForwardBelief, 100, None);
        for (dir_name, file, n) in [
            ("expert_data", "ullman.csv", 8),
            ("expert_data", "dodell-feder.csv", 8),
            ("expert_data", "kosinski.csv", 12),
            ("social_iqa", "social_iqa.csv", 30),
        ] {
            std::fs::create_dir_all(data.join(dir_name)).unwrap();
            let mut f = std::fs::File::create(data.join(dir_name).join(file)).unwrap();
            for i in 0..n {
                writeln!(f, "{file} story {i};question;right;wrong").unwrap();
            }
        }

        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let conditions = sample_exp1(data, &mut rng).unwrap();
        assert_eq!(conditions.len(), EXP1_CONDITIONS);
        assert!(conditions.iter().all(|c| c.len() == 30));
        let kosinski = conditions.iter().flatten().filter(|t| t.data_source == "kosinski").count();
        assert_eq!(kosinski, 9);

        // True and false items come from disjoint stories.
        let stories = |source: &str| -> Vec<String> {
            conditions
                .iter()
                .flatten()
                .filter(|t| t.data_source == source)
                .map(|t| t.story[1..].to_string())
                .collect()
        };
        let false_stories = stories("false_belief");
        assert!(stories("true_belief").iter().all(|s| !false_stories.contains(s)));

        let out = dir.path().join("prolific");
        let written = write_condition_files(&out, &conditions).unwrap();
        assert_eq!(written.len(), EXP1_CONDITIONS);
        let labelled = label_mcq_dir(&out).unwrap();
        assert_eq!(labelled.len(), EXP1_CONDITIONS);
        let tasks: Vec<Task> = read_json(&out.join("condition_0_mcq.json")).unwrap();
        assert!(tasks.iter().all(|t| t.true_labels.as_ref().unwrap().iter().sum::<u8>() == 1));
    }
}
