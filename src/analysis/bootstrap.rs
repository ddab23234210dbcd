use anyhow::{Result, ensure};
use rand::Rng;

use super::utility::{ALPHAP, BETAP, mean, median, mquantile, round3};

pub const DEFAULT_RESAMPLES: usize = 10_000;
pub const DEFAULT_CI: f64 = 95.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Mean,
    Median,
}

impl Statistic {
    pub fn apply(&self, values: &[f64]) -> f64 {
        match self {
            Statistic::Mean => mean(values),
            Statistic::Median => median(values),
        }
    }
}

/// Percentile bootstrap interval of `statistic` over `values`, with bounds
/// rounded to three decimals.
pub fn bootstrap_ci<R: Rng + ?Sized>(
    values: &[f64],
    resamples: usize,
    ci: f64,
    statistic: Statistic,
    rng: &mut R,
) -> Result<(f64, f64)> {
    ensure!(!values.is_empty(), "cannot bootstrap an empty sample");
    ensure!(resamples > 0, "bootstrap needs at least one resample");
    ensure!(ci > 0.0 && ci < 100.0, "confidence level {ci} must be in (0, 100)");

    let mut stats = Vec::with_capacity(resamples);
    let mut sample = vec![0.0; values.len()];
    for _ in 0..resamples {
        for slot in sample.iter_mut() {
            *slot = values[rng.gen_range(0..values.len())];
        }
        stats.push(statistic.apply(&sample));
    }
    stats.sort_by(f64::total_cmp);

    let lower = (100.0 - ci) / 2.0;
    let upper = 100.0 - lower;
    let low = mquantile(&stats, lower / 100.0, ALPHAP, BETAP);
    let high = mquantile(&stats, upper / 100.0, ALPHAP, BETAP);
    Ok((round3(low), round3(high)))
}
