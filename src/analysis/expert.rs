//! Combining the two expert raters' judgements of generated stories.

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::output::write_records;

pub const EXPERT_COMBINED_FILE: &str = "expert_combined.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertRow {
    /// 1 for `yes`, 0 for `no`, empty otherwise.
    pub desired_format: Option<u8>,
    pub rating: i64,
    pub item: usize,
    pub expert: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Agreement {
    pub items: usize,
    pub percentage: f64,
    pub alpha: Option<f64>,
}

fn desired_format(value: &str) -> Option<u8> {
    match value.trim() {
        "yes" => Some(1),
        "no" => Some(0),
        _ => None,
    }
}

/// Reads a `desired_format;rating` file, skipping its header line.
pub fn load_ratings(path: &Path, expert: &str) -> Result<Vec<ExpertRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut rows = Vec::new();
    for (item, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("parsing {}", path.display()))?;
        let rating = record.get(1).unwrap_or_default().trim();
        rows.push(ExpertRow {
            desired_format: desired_format(record.get(0).unwrap_or_default()),
            rating: rating
                .parse()
                .with_context(|| format!("{} item {item}: rating '{rating}'", path.display()))?,
            item,
            expert: expert.to_string(),
        });
    }
    Ok(rows)
}

/// Krippendorff's alpha with the interval metric over `units`, each holding
/// one optional value per rater. Units with fewer than two values are not
/// pairable and are ignored. `None` when no disagreement is expected.
pub fn krippendorff_alpha(units: &[Vec<Option<i64>>]) -> Option<f64> {
    let pairable: Vec<Vec<f64>> = units
        .iter()
        .map(|unit| unit.iter().flatten().map(|&v| v as f64).collect::<Vec<_>>())
        .filter(|values| values.len() >= 2)
        .collect();
    let n: usize = pairable.iter().map(Vec::len).sum();
    if n < 2 {
        return None;
    }

    let squared_diffs = |a: &[f64], b: &[f64]| -> f64 {
        a.iter()
            .flat_map(|x| b.iter().map(move |y| (x - y).powi(2)))
            .sum()
    };

    let observed: f64 = pairable
        .iter()
        .map(|values| squared_diffs(values, values) / (values.len() - 1) as f64)
        .sum::<f64>()
        / n as f64;

    let all: Vec<f64> = pairable.concat();
    let expected = squared_diffs(&all, &all) / (n * (n - 1)) as f64;
    if expected == 0.0 {
        return None;
    }
    Some(1.0 - observed / expected)
}

/// Combines two raters' files into `out` and reports their agreement on
/// `desired_format`.
#[tracing::instrument(skip_all, fields(first = %first.display(), second = %second.display()))]
pub fn combine_expert_ratings(first: &Path, second: &Path, out: &Path) -> Result<Agreement> {
    let expert_1 = load_ratings(first, "expert_1")?;
    let expert_2 = load_ratings(second, "expert_2")?;
    ensure!(!expert_1.is_empty(), "{} has no ratings", first.display());
    if expert_1.len() != expert_2.len() {
        warn!(first = expert_1.len(), second = expert_2.len(), "Raters rated different numbers of items");
    }

    let items = expert_1.len().min(expert_2.len());
    let agreeing = expert_1
        .iter()
        .zip(&expert_2)
        .filter(|(a, b)| a.desired_format.is_some() && a.desired_format == b.desired_format)
        .count();
    let percentage = agreeing as f64 / items.max(1) as f64 * 100.0;

    let units: Vec<Vec<Option<i64>>> = expert_1
        .iter()
        .zip(&expert_2)
        .map(|(a, b)| vec![a.desired_format.map(i64::from), b.desired_format.map(i64::from)])
        .collect();
    let alpha = krippendorff_alpha(&units);

    let combined: Vec<ExpertRow> = expert_1.into_iter().chain(expert_2).collect();
    write_records(out, &combined)?;

    info!(items, percentage, alpha = ?alpha, out = %out.display(), "Expert ratings combined");
    Ok(Agreement { items, percentage, alpha })
}
