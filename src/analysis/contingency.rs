use anyhow::{Result, anyhow, ensure};
use std::fmt;
use std::str::FromStr;

use super::results::ResultRow;

/// How correctness on the true and false halves of a design is combined.
/// Rows of the two halves are paired by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contingency {
    /// False half becomes `T and F`.
    TrueAndFalse,
    /// False half becomes `not T and F`.
    NotTrueAndFalse,
    /// True half becomes `F and T`.
    FalseAndTrue,
    /// True half becomes `not F and T`.
    NotFalseAndTrue,
    /// Rows left as they are.
    Marginal,
}

impl Contingency {
    pub const ALL: [Contingency; 5] = [
        Contingency::TrueAndFalse,
        Contingency::NotTrueAndFalse,
        Contingency::FalseAndTrue,
        Contingency::NotFalseAndTrue,
        Contingency::Marginal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Contingency::TrueAndFalse => "true_and_false",
            Contingency::NotTrueAndFalse => "not_true_and_false",
            Contingency::FalseAndTrue => "false_and_true",
            Contingency::NotFalseAndTrue => "not_false_and_true",
            Contingency::Marginal => "marginal",
        }
    }
}

impl fmt::Display for Contingency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Contingency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Contingency::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| anyhow!("unknown contingency '{s}'"))
    }
}

/// Splits rows into their true and false halves and rewrites one half's
/// `correct` per `contingency`. Returns the true half followed by the
/// false half. The halves must be the same size.
pub fn apply_contingency(rows: Vec<ResultRow>, contingency: Contingency) -> Result<Vec<ResultRow>> {
    let (mut true_half, mut false_half): (Vec<ResultRow>, Vec<ResultRow>) =
        rows.into_iter().partition(ResultRow::is_true_half);
    ensure!(
        true_half.len() == false_half.len(),
        "true and false halves differ in length ({} vs {})",
        true_half.len(),
        false_half.len()
    );

    let pairs = true_half.iter_mut().zip(false_half.iter_mut());
    match contingency {
        Contingency::TrueAndFalse => {
            for (t, f) in pairs {
                f.correct = (t.correct == 1 && f.correct == 1) as u8;
            }
        }
        Contingency::NotTrueAndFalse => {
            for (t, f) in pairs {
                f.correct = (t.correct == 0 && f.correct == 1) as u8;
            }
        }
        Contingency::FalseAndTrue => {
            for (t, f) in pairs {
                t.correct = (f.correct == 1 && t.correct == 1) as u8;
            }
        }
        Contingency::NotFalseAndTrue => {
            for (t, f) in pairs {
                t.correct = (f.correct == 0 && t.correct == 1) as u8;
            }
        }
        Contingency::Marginal => {}
    }

    true_half.extend(false_half);
    Ok(true_half)
}
