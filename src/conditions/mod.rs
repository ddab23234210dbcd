//! Condition generation.
//!
//! Each story template is expanded into one row per cell of the design:
//! initial belief shown/hidden × variable (forward belief, forward action,
//! backward belief, backward desire, percept-to-belief) × condition (true or
//! false belief, true or false control). Rows for a cell land in
//! `<conditions>/<init>_<variable>_<condition>/stories.csv`.

pub mod files;
pub mod generate;
pub mod types;

pub use files::{generate_conditions, load_condition_rows, stories_path};
pub use generate::generate_row;
pub use types::{
    ConditionKey, ConditionRow, Direction, InitialBelief, Subject, TruthCondition, Variable,
};
