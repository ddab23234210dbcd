//! Reading and writing `<key>/stories.csv` condition files.
//!
//! Condition files are semicolon-delimited and headerless:
//! `story;question;correct_answer;incorrect_answer`.

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::conditions::generate::generate_row;
use crate::conditions::types::{ConditionKey, ConditionRow};
use crate::template::StoryTemplate;

pub const STORIES_FILE: &str = "stories.csv";

/// Path of the stories file for `key` under `root`.
pub fn stories_path(root: &Path, key: &ConditionKey) -> PathBuf {
    key.dir(root).join(STORIES_FILE)
}

/// Writes one stories file per key, replacing any previous contents. Rows
/// appear in template order. Returns the row count per key.
#[tracing::instrument(skip(templates, keys), fields(templates = templates.len(), keys = keys.len(), out_dir = %out_dir.display()))]
pub fn generate_conditions(
    templates: &[StoryTemplate],
    keys: &[ConditionKey],
    out_dir: &Path,
) -> Result<BTreeMap<ConditionKey, usize>> {
    let mut counts = BTreeMap::new();

    for key in keys.iter().filter(|k| k.is_generated()) {
        let dir = key.dir(out_dir);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating condition directory {}", dir.display()))?;

        let path = dir.join(STORIES_FILE);
        let mut writer = WriterBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .from_path(&path)
            .with_context(|| format!("creating {}", path.display()))?;

        let mut written = 0;
        for (i, template) in templates.iter().enumerate() {
            let row = generate_row(template, *key)
                .with_context(|| format!("template {} for condition {}", i + 1, key))?;
            if let Some(row) = row {
                writer.serialize(&row)?;
                written += 1;
            } else {
                debug!(condition = %key, template = i + 1, "No row for template");
            }
        }
        writer.flush()?;

        info!(condition = %key, rows = written, "Condition written");
        counts.insert(*key, written);
    }

    Ok(counts)
}

/// Reads every row of a condition file.
pub fn load_condition_rows(path: &Path) -> Result<Vec<ConditionRow>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("opening condition file {}", path.display()))?;

    let mut rows = Vec::new();
    for (i, result) in reader.deserialize().enumerate() {
        let row: ConditionRow =
            result.with_context(|| format!("{} row {}", path.display(), i + 1))?;
        rows.push(row);
    }
    Ok(rows)
}
