//! Reshaping Prolific exports of the human experiments into long tables.
//!
//! Each experiment export is three CSV files with one participant per row:
//! trials (`workerid`, `proliferate.condition`, `trial1..trialN` holding the
//! trial as JSON or a Python literal), ids (`prolificPid`) and the exit survey (`age`,
//! `ethnicity`, `gender`, `race`). Rows of the three files line up by
//! position.

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

use crate::output::write_records;

pub const EXP1_TRIALS: usize = 30;
pub const EXP2_BATCH1_TRIALS: usize = 42;
pub const EXP2_BATCH2_TRIALS: usize = 12;
pub const EXP1_LONG_FILE: &str = "main_01_long.csv";
pub const EXP2_LONG_FILE: &str = "main_02_long.csv";

/// One trial cell of a trials export.
#[derive(Debug, Clone, Deserialize)]
pub struct Trial {
    pub id: String,
    pub data_source: String,
    #[serde(default)]
    pub story: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answers: Value,
    #[serde(default, rename = "likertResponses")]
    pub likert_responses: BTreeMap<String, Value>,
    #[serde(default)]
    pub selected_answer_idx: Value,
    #[serde(default)]
    pub true_labels: Vec<Value>,
}

/// Integers arrive as numbers or as strings depending on the export.
fn lenient_int(value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| anyhow!("{n} is not an integer")),
        Value::String(s) => s.trim().parse().with_context(|| format!("'{s}' is not an integer")),
        Value::Bool(b) => Ok(*b as i64),
        other => bail!("{other} is not an integer"),
    }
}

/// Participant-level columns shared by every trial of that participant.
#[derive(Debug, Clone)]
struct Participant {
    worker_id: String,
    split: String,
    prolific_id: String,
    age: String,
    ethnicity: String,
    gender: String,
    race: String,
    trials: HashMap<String, String>,
}

impl Participant {
    fn trial(&self, n: usize) -> Result<Trial> {
        let column = format!("trial{n}");
        let cell = self
            .trials
            .get(&column)
            .with_context(|| format!("worker {} has no column {column}", self.worker_id))?;
        parse_trial_cell(cell).with_context(|| format!("worker {} {column}", self.worker_id))
    }
}

/// Trial cells are JSON or a Python literal (`'single quotes'`,
/// `True`/`False`/`None`), depending on how the export was written.
fn parse_trial_cell(cell: &str) -> Result<Trial> {
    match serde_json::from_str(cell) {
        Ok(trial) => Ok(trial),
        Err(json_err) => serde_json::from_str(&python_literal_to_json(cell))
            .map_err(|_| anyhow::Error::new(json_err)),
    }
}

/// Rewrites a Python dict/list literal as JSON text.
fn python_literal_to_json(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    let mut chars = literal.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                out.push('"');
                while let Some(inner) = chars.next() {
                    match inner {
                        '\\' => match chars.next() {
                            Some('\'') => out.push('\''),
                            Some(escaped) => {
                                out.push('\\');
                                out.push(escaped);
                            }
                            None => out.push_str("\\\\"),
                        },
                        '"' if c == '\'' => out.push_str("\\\""),
                        q if q == c => break,
                        other => out.push(other),
                    }
                }
                out.push('"');
            }
            c if c.is_ascii_alphabetic() => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if !next.is_ascii_alphanumeric() && next != '_' {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    _ => &word,
                });
            }
            other => out.push(other),
        }
    }
    out
}

fn read_rows(path: &Path) -> Result<Vec<HashMap<String, String>>> {
    let mut reader = csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    reader
        .deserialize()
        .collect::<Result<Vec<HashMap<String, String>>, _>>()
        .with_context(|| format!("parsing {}", path.display()))
}

fn column(row: &HashMap<String, String>, name: &str) -> String {
    row.get(name).cloned().unwrap_or_default()
}

fn load_participants(dir: &Path, prefix: &str, suffix: &str) -> Result<Vec<Participant>> {
    let trials = read_rows(&dir.join(format!("{prefix}_trials{suffix}.csv")))?;
    let ids = read_rows(&dir.join(format!("{prefix}_ids{suffix}.csv")))?;
    let exit = read_rows(&dir.join(format!("{prefix}_exit{suffix}.csv")))?;
    if ids.len() < trials.len() || exit.len() < trials.len() {
        bail!(
            "{prefix}{suffix}: {} trial rows but {} id rows and {} exit rows",
            trials.len(),
            ids.len(),
            exit.len()
        );
    }

    Ok(trials
        .into_iter()
        .zip(ids.iter().zip(exit.iter()))
        .map(|(trials, (ids, exit))| Participant {
            worker_id: column(&trials, "workerid"),
            split: column(&trials, "proliferate.condition"),
            prolific_id: column(ids, "prolificPid"),
            age: column(exit, "age"),
            ethnicity: column(exit, "ethnicity"),
            gender: column(exit, "gender"),
            race: column(exit, "race"),
            trials,
        })
        .collect())
}

/// Groups a trial's data source for comparison across item sets.
pub fn survey_type(data_source: &str) -> &'static str {
    match data_source {
        "dodell" | "ullman" | "kosinski" => "expert",
        "true_belief" | "false_belief" => "ours",
        "social_iqa" => "social_iqa",
        _ => "unknown",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exp1Row {
    pub data_source: String,
    pub split: String,
    pub survey_type: String,
    pub item_id: String,
    pub worker_id: String,
    pub prolific_id: String,
    pub age: String,
    pub ethnicity: String,
    pub gender: String,
    pub race: String,
    pub item_story: String,
    pub item_question: String,
    pub item_answers: String,
    pub understandability: i64,
    pub coherent_q_a: i64,
    pub unambiguous: i64,
    pub average_rating: f64,
}

fn exp1_row(participant: &Participant, trial: Trial) -> Result<Exp1Row> {
    // Likert keys sort into the order understandability, coherence, ambiguity.
    let ratings = trial
        .likert_responses
        .values()
        .map(lenient_int)
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("ratings of item {}", trial.id))?;
    let [understandability, coherent_q_a, unambiguous, ..] = *ratings.as_slice() else {
        bail!("item {} has {} ratings, expected 3", trial.id, ratings.len());
    };
    let average_rating = ratings.iter().sum::<i64>() as f64 / ratings.len() as f64;

    Ok(Exp1Row {
        survey_type: survey_type(&trial.data_source).to_string(),
        data_source: trial.data_source,
        split: participant.split.clone(),
        item_id: trial.id,
        worker_id: participant.worker_id.clone(),
        prolific_id: participant.prolific_id.clone(),
        age: participant.age.clone(),
        ethnicity: participant.ethnicity.clone(),
        gender: participant.gender.clone(),
        race: participant.race.clone(),
        item_story: trial.story,
        item_question: trial.question,
        item_answers: trial.answers.to_string(),
        understandability,
        coherent_q_a,
        unambiguous,
        average_rating,
    })
}

/// Reads `main_01_{trials,ids,exit}_complete.csv` from `dir` and writes
/// one row per rated item to `main_01_long.csv`. Returns the row count.
#[tracing::instrument(skip_all, fields(dir = %dir.display()))]
pub fn format_exp_1(dir: &Path) -> Result<usize> {
    let participants = load_participants(dir, "main_01", "_complete")?;

    let mut rows = Vec::with_capacity(participants.len() * EXP1_TRIALS);
    for participant in &participants {
        for n in 1..=EXP1_TRIALS {
            rows.push(exp1_row(participant, participant.trial(n)?)?);
        }
    }
    rows.sort_by(|a, b| (&a.survey_type, &a.item_id).cmp(&(&b.survey_type, &b.item_id)));

    let out = dir.join(EXP1_LONG_FILE);
    write_records(&out, &rows)?;
    info!(participants = participants.len(), rows = rows.len(), out = %out.display(), "Experiment 1 formatted");
    Ok(rows.len())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exp2Row {
    pub data_source: String,
    pub split: String,
    pub survey_type: String,
    pub item_id: String,
    pub worker_id: String,
    pub prolific_id: String,
    pub age: String,
    pub ethnicity: String,
    pub gender: String,
    pub race: String,
    pub item_story: String,
    pub item_question: String,
    pub item_answers: String,
    pub item_true_answers: String,
    pub response: i64,
    pub correct: u8,
    pub true_false: bool,
}

/// Whether the selected answer is right. Attention checks have fixed keys.
pub fn is_correct(trial: &Trial) -> Result<bool> {
    let response = lenient_int(&trial.selected_answer_idx).with_context(|| format!("response to {}", trial.id))?;
    Ok(match trial.id.as_str() {
        "attention_check_1" => response == 0,
        "attention_check_2" => response == 1,
        _ => {
            let label = usize::try_from(response)
                .ok()
                .and_then(|i| trial.true_labels.get(i))
                .with_context(|| format!("item {} has no label for answer {response}", trial.id))?;
            lenient_int(label)? == 1
        }
    })
}

/// `true`/`false` from the data source suffix, e.g. `forward_belief_true`.
fn truth_of(data_source: &str) -> Option<bool> {
    match data_source.rsplit('_').next() {
        Some("true") => Some(true),
        Some("false") => Some(false),
        _ => None,
    }
}

fn exp2_row(participant: &Participant, trial: Trial) -> Result<Option<Exp2Row>> {
    let Some(true_false) = truth_of(&trial.data_source) else {
        debug!(item = %trial.id, data_source = %trial.data_source, "Dropping trial without truth label");
        return Ok(None);
    };
    let correct = is_correct(&trial)?;
    let response = lenient_int(&trial.selected_answer_idx)?;

    Ok(Some(Exp2Row {
        survey_type: trial.data_source.clone(),
        data_source: trial.data_source,
        split: participant.split.clone(),
        item_id: trial.id,
        worker_id: participant.worker_id.clone(),
        prolific_id: participant.prolific_id.clone(),
        age: participant.age.clone(),
        ethnicity: participant.ethnicity.clone(),
        gender: participant.gender.clone(),
        race: participant.race.clone(),
        item_story: trial.story,
        item_question: trial.question,
        item_answers: trial.answers.to_string(),
        item_true_answers: Value::Array(trial.true_labels).to_string(),
        response,
        correct: correct as u8,
        true_false,
    }))
}

/// Reads both experiment 2 batches (`main_02_{trials,ids,exit}_{1,2}.csv`)
/// from `dir` and writes `main_02_long.csv`. The first batch also carried
/// backward items, which are dropped. Returns the row count.
#[tracing::instrument(skip_all, fields(dir = %dir.display()))]
pub fn format_exp_2(dir: &Path) -> Result<usize> {
    let batches = [("_1", EXP2_BATCH1_TRIALS, true), ("_2", EXP2_BATCH2_TRIALS, false)];

    let mut rows = Vec::new();
    for (suffix, num_trials, drop_backward) in batches {
        let participants = load_participants(dir, "main_02", suffix)?;
        for participant in &participants {
            for n in 1..=num_trials {
                let trial = participant.trial(n)?;
                if drop_backward && trial.id.contains("backward") {
                    continue;
                }
                if let Some(row) = exp2_row(participant, trial)? {
                    rows.push(row);
                }
            }
        }
        debug!(batch = suffix, participants = participants.len(), "Batch read");
    }
    rows.sort_by(|a, b| (&a.survey_type, &a.item_id).cmp(&(&b.survey_type, &b.item_id)));

    let out = dir.join(EXP2_LONG_FILE);
    write_records(&out, &rows)?;
    info!(rows = rows.len(), out = %out.display(), "Experiment 2 formatted");
    Ok(rows.len())
}
