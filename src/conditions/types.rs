//! Axes of the experimental design and the key that names each cell.

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Whether the protagonist's initial belief sentence is kept in the story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InitialBelief {
    Hidden,
    Shown,
}

impl InitialBelief {
    pub const ALL: [InitialBelief; 2] = [InitialBelief::Hidden, InitialBelief::Shown];

    pub fn as_str(&self) -> &'static str {
        match self {
            InitialBelief::Hidden => "0",
            InitialBelief::Shown => "1",
        }
    }
}

impl fmt::Display for InitialBelief {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InitialBelief {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "0" | "hidden" => Ok(InitialBelief::Hidden),
            "1" | "shown" => Ok(InitialBelief::Shown),
            _ => bail!("unknown initial belief '{s}' (expected 0 or 1)"),
        }
    }
}

/// Which way the question points relative to the pivotal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Forward,
    Backward,
    Percept,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Percept => "percept",
        }
    }
}

/// The mental state (or behaviour) a question probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Subject {
    Belief,
    Desire,
    Action,
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Belief => "belief",
            Subject::Desire => "desire",
            Subject::Action => "action",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    ForwardBelief,
    ForwardAction,
    BackwardBelief,
    BackwardDesire,
    PerceptToBelief,
}

impl Variable {
    pub const ALL: [Variable; 5] = [
        Variable::ForwardBelief,
        Variable::ForwardAction,
        Variable::BackwardBelief,
        Variable::BackwardDesire,
        Variable::PerceptToBelief,
    ];

    /// Variables generated when none are requested explicitly.
    pub const STUDY: [Variable; 4] = [
        Variable::ForwardBelief,
        Variable::ForwardAction,
        Variable::BackwardBelief,
        Variable::PerceptToBelief,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variable::ForwardBelief => "forward_belief",
            Variable::ForwardAction => "forward_action",
            Variable::BackwardBelief => "backward_belief",
            Variable::BackwardDesire => "backward_desire",
            Variable::PerceptToBelief => "percept_to_belief",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Variable::ForwardBelief | Variable::ForwardAction => Direction::Forward,
            Variable::BackwardBelief | Variable::BackwardDesire => Direction::Backward,
            Variable::PerceptToBelief => Direction::Percept,
        }
    }

    pub fn subject(&self) -> Subject {
        match self {
            Variable::ForwardBelief | Variable::BackwardBelief | Variable::PerceptToBelief => {
                Subject::Belief
            }
            Variable::ForwardAction => Subject::Action,
            Variable::BackwardDesire => Subject::Desire,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variable {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Variable::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| anyhow!("unknown variable '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruthCondition {
    TrueBelief,
    FalseBelief,
    TrueControl,
    FalseControl,
}

impl TruthCondition {
    pub const ALL: [TruthCondition; 4] = [
        TruthCondition::TrueBelief,
        TruthCondition::FalseBelief,
        TruthCondition::TrueControl,
        TruthCondition::FalseControl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TruthCondition::TrueBelief => "true_belief",
            TruthCondition::FalseBelief => "false_belief",
            TruthCondition::TrueControl => "true_control",
            TruthCondition::FalseControl => "false_control",
        }
    }

    /// `true` for the true-belief and true-control halves of the design.
    pub fn truth(&self) -> bool {
        matches!(self, TruthCondition::TrueBelief | TruthCondition::TrueControl)
    }

    /// `"belief"` or `"control"`.
    pub fn kind(&self) -> &'static str {
        match self {
            TruthCondition::TrueBelief | TruthCondition::FalseBelief => "belief",
            TruthCondition::TrueControl | TruthCondition::FalseControl => "control",
        }
    }

    pub fn is_control(&self) -> bool {
        self.kind() == "control"
    }
}

impl fmt::Display for TruthCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TruthCondition {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        TruthCondition::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| anyhow!("unknown condition '{s}'"))
    }
}

/// One cell of the design, rendered `{init}_{variable}_{condition}`
/// (e.g. `1_forward_belief_false_control`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConditionKey {
    pub init_belief: InitialBelief,
    pub variable: Variable,
    pub condition: TruthCondition,
}

impl ConditionKey {
    pub fn new(init_belief: InitialBelief, variable: Variable, condition: TruthCondition) -> Self {
        Self {
            init_belief,
            variable,
            condition,
        }
    }

    /// Cartesian product of the three axes, in axis order.
    pub fn grid(
        inits: &[InitialBelief],
        variables: &[Variable],
        conditions: &[TruthCondition],
    ) -> Vec<ConditionKey> {
        let mut keys = Vec::with_capacity(inits.len() * variables.len() * conditions.len());
        for &init in inits {
            for &variable in variables {
                for &condition in conditions {
                    keys.push(ConditionKey::new(init, variable, condition));
                }
            }
        }
        keys
    }

    /// Percept-to-belief is only ever written for a shown initial belief in
    /// the true-belief condition.
    pub fn is_generated(&self) -> bool {
        self.variable != Variable::PerceptToBelief
            || (self.init_belief == InitialBelief::Shown
                && self.condition == TruthCondition::TrueBelief)
    }

    /// Directory of this cell under a conditions or results root.
    pub fn dir(&self, root: &Path) -> PathBuf {
        root.join(self.to_string())
    }
}

impl fmt::Display for ConditionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.init_belief, self.variable, self.condition)
    }
}

impl FromStr for ConditionKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (init, rest) = s
            .split_once('_')
            .ok_or_else(|| anyhow!("'{s}' is not a condition key"))?;
        let init_belief = init.parse()?;

        let condition = TruthCondition::ALL
            .into_iter()
            .find(|c| rest.ends_with(&format!("_{}", c.as_str())))
            .ok_or_else(|| anyhow!("'{s}' does not end in a known condition"))?;
        let variable = rest[..rest.len() - condition.as_str().len() - 1].parse()?;

        Ok(ConditionKey::new(init_belief, variable, condition))
    }
}

/// A generated item: the story, its question and the two candidate answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionRow {
    pub story: String,
    pub question: String,
    pub correct_answer: String,
    pub incorrect_answer: String,
}
