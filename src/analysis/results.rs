//! Collecting per-item model grades into one tidy table.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::conditions::ConditionKey;
use crate::evaluate::Grade;
use crate::output::{read_lines, write_records};

pub const RAW_RESULTS_FILE: &str = "raw_model_results.csv";

/// One graded item of one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub correct: u8,
    /// `0` (initial belief hidden) or `1` (shown).
    pub init_belief: String,
    pub direction: String,
    pub variable: String,
    /// `true` or `false`.
    pub true_false: String,
    /// `belief` or `control`.
    pub condition: String,
    pub model_name: String,
    pub temperature: f64,
    pub method: String,
}

impl ResultRow {
    pub fn is_true_half(&self) -> bool {
        self.true_false == "true"
    }
}

/// Model, temperature and method recovered from an accuracy file name.
#[derive(Debug, Clone, PartialEq)]
pub struct RunName {
    pub model_name: String,
    pub temperature: f64,
    pub method: String,
}

fn strip_range(stem: &str) -> &str {
    let parts: Vec<&str> = stem.rsplitn(3, '_').collect();
    if parts.len() == 3 && parts[0].parse::<usize>().is_ok() && parts[1].parse::<usize>().is_ok() {
        parts[2]
    } else {
        stem
    }
}

/// Parses `accuracy_{model}_{temperature}_{method}_{variable}_{condition}[_{offset}_{num_probs}].csv`
/// for a file stored under `key`. The variable may be written in full
/// (`forward_belief`) or as its subject alone (`belief`).
pub fn parse_accuracy_file_name(file_name: &str, key: &ConditionKey) -> Result<RunName> {
    let stem = file_name
        .strip_prefix("accuracy_")
        .and_then(|s| s.strip_suffix(".csv"))
        .with_context(|| format!("'{file_name}' is not an accuracy file"))?;

    let stem = strip_range(stem);
    let stem = stem
        .strip_suffix(&format!("_{}", key.condition))
        .with_context(|| format!("'{file_name}' does not name condition {}", key.condition))?;
    let stem = stem
        .strip_suffix(&format!("_{}", key.variable))
        .or_else(|| stem.strip_suffix(&format!("_{}", key.variable.subject().as_str())))
        .with_context(|| format!("'{file_name}' does not name variable {}", key.variable))?;

    let mut parts = stem.rsplitn(3, '_');
    let (Some(method), Some(temperature), Some(model_name)) = (parts.next(), parts.next(), parts.next())
    else {
        bail!("'{file_name}' has no model, temperature and method");
    };
    let temperature = temperature
        .parse()
        .with_context(|| format!("'{file_name}' has temperature '{temperature}'"))?;

    Ok(RunName {
        model_name: model_name.to_string(),
        temperature,
        method: method.strip_prefix("chat-").unwrap_or(method).to_string(),
    })
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("reading directory {}", dir.display()))?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

/// Reads every `<key>/accuracy_*.csv` under `results_dir`.
pub fn collect_model_results(results_dir: &Path) -> Result<Vec<ResultRow>> {
    let mut rows = Vec::new();

    for dir in sorted_entries(results_dir)?.into_iter().filter(|p| p.is_dir()) {
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let key: ConditionKey = match name.parse() {
            Ok(key) => key,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Skipping directory");
                continue;
            }
        };

        for file in sorted_entries(&dir)? {
            let Some(file_name) = file.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !file_name.starts_with("accuracy_") {
                continue;
            }
            let run = match parse_accuracy_file_name(file_name, &key) {
                Ok(run) => run,
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "Skipping accuracy file");
                    continue;
                }
            };

            for (i, value) in read_lines(&file)?.iter().enumerate() {
                let grade: Grade = value
                    .parse()
                    .with_context(|| format!("{} row {}", file.display(), i + 1))?;
                rows.push(ResultRow {
                    correct: grade.is_correct() as u8,
                    init_belief: key.init_belief.to_string(),
                    direction: key.variable.direction().as_str().to_string(),
                    variable: key.variable.subject().as_str().to_string(),
                    true_false: key.condition.truth().to_string(),
                    condition: key.condition.kind().to_string(),
                    model_name: run.model_name.clone(),
                    temperature: run.temperature,
                    method: run.method.clone(),
                });
            }
        }
    }

    Ok(rows)
}

/// Collects all model results and writes them to `out`. Returns the row count.
#[tracing::instrument(skip_all, fields(results_dir = %results_dir.display()))]
pub fn format_model_results(results_dir: &Path, out: &Path) -> Result<usize> {
    let rows = collect_model_results(results_dir)?;
    write_records(out, &rows)?;
    info!(rows = rows.len(), out = %out.display(), "Model results written");
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::{InitialBelief, TruthCondition, Variable};
    use crate::output::{read_records, write_lines};

    fn key() -> ConditionKey {
        ConditionKey::new(InitialBelief::Hidden, Variable::BackwardBelief, TruthCondition::TrueControl)
    }

    #[test]
    fn test_parse_current_file_name() {
        let run = parse_accuracy_file_name(
            "accuracy_openai_text-davinci-003_0.0_1shot-cot_backward_belief_true_control_0_200.csv",
            &key(),
        )
        .unwrap();
        assert_eq!(
            run,
            RunName {
                model_name: "openai_text-davinci-003".to_string(),
                temperature: 0.0,
                method: "1shot-cot".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_legacy_file_name() {
        let run = parse_accuracy_file_name("accuracy_gpt-4_0.0_chat-0shot_belief_true_control.csv", &key()).unwrap();
        assert_eq!(run.model_name, "gpt-4");
        assert_eq!(run.method, "0shot");
    }

    #[test]
    fn test_parse_rejects_other_condition() {
        assert!(parse_accuracy_file_name("accuracy_gpt-4_0.0_0shot_backward_belief_false_control.csv", &key()).is_err());
        assert!(parse_accuracy_file_name("prediction_gpt-4_0.0_0shot_backward_belief_true_control.csv", &key()).is_err());
    }

    #[test]
    fn test_collect_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let cell = dir.path().join(key().to_string());
        write_lines(
            &cell.join("accuracy_gpt-4_0.0_chat-0shot_backward_belief_true_control_0_3.csv"),
            &["True", "False", "True"],
        )
        .unwrap();
        write_lines(
            &cell.join("prediction_gpt-4_0.0_chat-0shot_backward_belief_true_control_0_3.csv"),
            &["a)", "b)", "a)"],
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("plots")).unwrap();

        let out = dir.path().join(RAW_RESULTS_FILE);
        assert_eq!(format_model_results(dir.path(), &out).unwrap(), 3);

        let rows: Vec<ResultRow> = read_records(&out).unwrap();
        assert_eq!(rows.iter().map(|r| r.correct).collect::<Vec<_>>(), vec![1, 0, 1]);
        let r = &rows[0];
        assert_eq!(r.init_belief, "0");
        assert_eq!(r.direction, "backward");
        assert_eq!(r.variable, "belief");
        assert_eq!(r.true_false, "true");
        assert_eq!(r.condition, "control");
        assert_eq!(r.method, "0shot");
    }
}
