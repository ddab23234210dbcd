//! Turning graded runs and human responses into tables.

pub mod bootstrap;
pub mod contingency;
pub mod expert;
pub mod human;
pub mod results;
pub mod stats;
pub mod utility;

pub use bootstrap::{DEFAULT_CI, DEFAULT_RESAMPLES, Statistic, bootstrap_ci};
pub use contingency::{Contingency, apply_contingency};
pub use expert::{Agreement, EXPERT_COMBINED_FILE, combine_expert_ratings, krippendorff_alpha};
pub use human::{EXP1_LONG_FILE, EXP2_LONG_FILE, format_exp_1, format_exp_2};
pub use results::{RAW_RESULTS_FILE, ResultRow, collect_model_results, format_model_results};
pub use stats::{PlotFilter, StatsRow, compute_stats, plot_table};
