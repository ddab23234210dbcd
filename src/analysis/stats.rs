//! Mean accuracy and bootstrap intervals per question type.

use anyhow::Result;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use super::bootstrap::{DEFAULT_CI, Statistic, bootstrap_ci};
use super::contingency::{Contingency, apply_contingency};
use super::results::ResultRow;
use super::utility::mean;
use crate::evaluate::format_temperature;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsRow {
    /// Title-cased `"{direction} {variable}"`, e.g. `Forward Belief`.
    pub question: String,
    /// `true` or `false`.
    #[serde(rename = "type")]
    pub kind: String,
    pub init_belief: String,
    pub condition: String,
    pub model_name: String,
    pub temperature: f64,
    pub method: String,
    pub average_accuracy: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    pub n: usize,
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

type GroupKey = (String, String, String, String, String, String, String, String);

fn group_key(row: &ResultRow) -> GroupKey {
    (
        row.direction.clone(),
        row.condition.clone(),
        row.init_belief.clone(),
        row.variable.clone(),
        row.true_false.clone(),
        row.model_name.clone(),
        row.method.clone(),
        format_temperature(row.temperature),
    )
}

/// Groups rows by direction, condition, initial belief, variable, truth,
/// model, method and temperature, and reports mean accuracy with a
/// bootstrapped 95% interval for each group. Groups come out in key order.
pub fn compute_stats<R: Rng + ?Sized>(rows: &[ResultRow], resamples: usize, rng: &mut R) -> Result<Vec<StatsRow>> {
    let mut groups: BTreeMap<GroupKey, Vec<&ResultRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(group_key(row)).or_default().push(row);
    }

    let mut stats = Vec::with_capacity(groups.len());
    for ((direction, condition, init_belief, variable, true_false, model_name, method, _), members) in groups {
        let values: Vec<f64> = members.iter().map(|r| r.correct as f64).collect();
        let (ci_low, ci_high) = bootstrap_ci(&values, resamples, DEFAULT_CI, Statistic::Mean, rng)?;
        let row = StatsRow {
            question: title_case(&format!("{direction} {variable}")),
            kind: true_false,
            init_belief,
            condition,
            model_name,
            temperature: members[0].temperature,
            method,
            average_accuracy: mean(&values),
            ci_low,
            ci_high,
            n: values.len(),
        };
        debug!(question = %row.question, kind = %row.kind, accuracy = row.average_accuracy, "Group summarised");
        stats.push(row);
    }
    Ok(stats)
}

/// Selects one model's runs for a single plot.
#[derive(Debug, Clone)]
pub struct PlotFilter {
    pub model_name: String,
    pub init_belief: String,
    pub condition: String,
    pub method: String,
    pub contingency: Contingency,
}

impl PlotFilter {
    fn matches(&self, row: &ResultRow) -> bool {
        row.model_name == self.model_name
            && row.init_belief == self.init_belief
            && row.condition == self.condition
            && row.method == self.method
    }
}

/// The numbers a results bar chart would draw: the filtered rows, combined
/// per the filter's contingency, summarised by [`compute_stats`].
pub fn plot_table<R: Rng + ?Sized>(
    rows: &[ResultRow],
    filter: &PlotFilter,
    resamples: usize,
    rng: &mut R,
) -> Result<Vec<StatsRow>> {
    let selected: Vec<ResultRow> = rows.iter().filter(|r| filter.matches(r)).cloned().collect();
    let combined = apply_contingency(selected, filter.contingency)?;
    compute_stats(&combined, resamples, rng)
}
